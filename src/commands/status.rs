use clap::Args;

use margin_core::{NetworkLayer, Permission, PersistenceLayer};

#[derive(Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn run(&self, layer: &PersistenceLayer) -> Result<(), Box<dyn std::error::Error>> {
        let capabilities = layer.capabilities()?;

        println!("Repository");
        println!("==========\n");

        if let Some(overview) = layer.overview().await? {
            println!("documents: {}", overview.nr_docs);
            if let Some(created) = overview.created {
                println!("created:   {}", created.to_rfc3339());
            }
        }

        let network = match capabilities.network_layer {
            NetworkLayer::Local => "local",
            NetworkLayer::Web => "web",
        };
        let permission = match capabilities.permission {
            Permission::Read => "read-only",
            Permission::ReadWrite => "read-write",
        };
        println!("storage:   {} ({})", network, permission);

        let tags = layer.tags_db()?.tags();
        println!("tags:      {}", tags.len());

        Ok(())
    }
}
