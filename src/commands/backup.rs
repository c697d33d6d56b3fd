use clap::Args;

use margin_core::PersistenceLayer;

#[derive(Args)]
pub struct BackupCommand {}

impl BackupCommand {
    pub async fn run(&self, layer: &PersistenceLayer) -> Result<(), Box<dyn std::error::Error>> {
        let nr_docs = layer.get_doc_meta_refs().await?.len();
        layer.create_backup().await?;
        println!("Backed up {} document(s)", nr_docs);
        Ok(())
    }
}
