use clap::{Args, Subcommand};

use margin_core::{PersistenceLayer, Tag};

#[derive(Args)]
pub struct TagCommand {
    #[command(subcommand)]
    pub command: TagSubcommand,
}

#[derive(Subcommand)]
pub enum TagSubcommand {
    /// Add tags to a document
    Add {
        /// Document fingerprint
        fingerprint: String,

        /// Tags to add (can be repeated)
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Remove tags from a document
    Remove {
        /// Document fingerprint
        fingerprint: String,

        /// Tags to remove (can be repeated)
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// List all tags known to the repository
    List,
}

impl TagCommand {
    pub async fn run(&self, layer: &PersistenceLayer) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            TagSubcommand::Add { fingerprint, tags } => {
                let mut doc = layer
                    .get_doc_meta(fingerprint)
                    .await?
                    .ok_or_else(|| format!("Document not found: {}", fingerprint))?;

                for raw in tags {
                    let tag = Tag::parse(raw)?;
                    doc.doc_info.tags.insert(tag.id.clone(), tag);
                }

                let doc_info = layer.write_doc_meta(&doc, None).await?;
                let labels: Vec<String> =
                    doc_info.tags.values().map(|t| t.label.clone()).collect();
                println!("Tags: {}", labels.join(", "));
                Ok(())
            }

            TagSubcommand::Remove { fingerprint, tags } => {
                let mut doc = layer
                    .get_doc_meta(fingerprint)
                    .await?
                    .ok_or_else(|| format!("Document not found: {}", fingerprint))?;

                for raw in tags {
                    let tag = Tag::parse(raw)?;
                    doc.doc_info.tags.remove(&tag.id);
                }

                let doc_info = layer.write_doc_meta(&doc, None).await?;
                let labels: Vec<String> =
                    doc_info.tags.values().map(|t| t.label.clone()).collect();
                if labels.is_empty() {
                    println!("No tags left on document");
                } else {
                    println!("Tags: {}", labels.join(", "));
                }
                Ok(())
            }

            TagSubcommand::List => {
                let tags = layer.tags_db()?.tags();

                if tags.is_empty() {
                    println!("No tags found");
                    return Ok(());
                }

                for tag in &tags {
                    println!("{}", tag.label);
                }
                println!("\nTotal: {} tag(s)", tags.len());
                Ok(())
            }
        }
    }
}
