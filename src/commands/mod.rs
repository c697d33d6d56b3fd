mod backup;
mod config_cmd;
mod doc;
mod status;
mod tag;

pub use backup::BackupCommand;
pub use config_cmd::ConfigCommand;
pub use doc::DocCommand;
pub use status::StatusCommand;
pub use tag::TagCommand;
