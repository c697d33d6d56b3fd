use clap::{Args, Subcommand, ValueEnum};
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use uuid::Uuid;

use margin_core::{fingerprint, Backend, DocMeta, DocMetaFileRef, FileRef, PersistenceLayer};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AnnotationKind {
    Comment,
    Note,
    Flashcard,
    TextHighlight,
    AreaHighlight,
}

#[derive(Args)]
pub struct DocCommand {
    #[command(subcommand)]
    pub command: DocSubcommand,
}

#[derive(Subcommand)]
pub enum DocSubcommand {
    /// Import a document into the repository
    Import {
        /// Path to the document file
        path: PathBuf,

        /// Display title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Number of pages
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },

    /// List all documents
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a document's details
    Show {
        /// Document fingerprint
        fingerprint: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Add an annotation to a document page
    Annotate {
        /// Document fingerprint
        fingerprint: String,

        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Annotation category
        #[arg(long, value_enum, default_value = "note")]
        kind: AnnotationKind,

        /// Annotation text
        text: String,
    },

    /// Delete a document and its imported file
    Delete {
        /// Document fingerprint
        fingerprint: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl DocCommand {
    pub async fn run(&self, layer: &PersistenceLayer) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            DocSubcommand::Import { path, title, pages } => {
                let data = std::fs::read(path)
                    .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

                let fingerprint = fingerprint::from_bytes(&data);
                if layer.contains(&fingerprint).await? {
                    return Err(format!("Document already imported: {}", fingerprint).into());
                }

                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .ok_or("Path has no file name")?;

                layer
                    .write_file(Backend::Stash, &FileRef::new(&file_name), data)
                    .await?;

                let mut doc = DocMeta::create(&fingerprint, *pages);
                doc.doc_info.title = Some(title.clone().unwrap_or_else(|| file_name.clone()));
                doc.doc_info.filename = Some(file_name);

                let doc_info = layer.write_doc_meta(&doc, None).await?;

                println!("Imported document:");
                println!("  fingerprint: {}", doc_info.fingerprint);
                println!("  title:       {}", doc_info.title.as_deref().unwrap_or("-"));
                println!("  pages:       {}", doc_info.nr_pages);
                Ok(())
            }

            DocSubcommand::List { format } => {
                let refs = layer.get_doc_meta_refs().await?;

                let mut docs = Vec::new();
                for doc_ref in &refs {
                    if let Some(doc) = layer.get_doc_meta(&doc_ref.fingerprint).await? {
                        docs.push(doc);
                    }
                }

                if docs.is_empty() {
                    println!("No documents found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        let infos: Vec<_> = docs.iter().map(|d| &d.doc_info).collect();
                        println!("{}", serde_json::to_string_pretty(&infos)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:<16}  {:<40}  {:>5}  {:>11}  TAGS",
                            "FINGERPRINT", "TITLE", "PAGES", "ANNOTATIONS"
                        );
                        println!("{}", "-".repeat(90));
                        for doc in &docs {
                            let info = &doc.doc_info;
                            let title = info.title.as_deref().unwrap_or("-");
                            let title = if title.len() > 40 {
                                format!("{}...", &title[..37])
                            } else {
                                title.to_string()
                            };
                            let tags: Vec<String> =
                                info.tags.values().map(|t| t.label.clone()).collect();
                            println!(
                                "{:<16}  {:<40}  {:>5}  {:>11}  {}",
                                short_fingerprint(&info.fingerprint),
                                title,
                                info.nr_pages,
                                info.nr_annotations,
                                tags.join(", ")
                            );
                        }
                        println!("\nTotal: {} document(s)", docs.len());
                    }
                }
                Ok(())
            }

            DocSubcommand::Show {
                fingerprint,
                format,
            } => {
                let doc = layer
                    .get_doc_meta(fingerprint)
                    .await?
                    .ok_or_else(|| format!("Document not found: {}", fingerprint))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", doc.serialize()?);
                    }
                    OutputFormat::Text => {
                        let info = &doc.doc_info;
                        println!("fingerprint:  {}", info.fingerprint);
                        println!("title:        {}", info.title.as_deref().unwrap_or("-"));
                        if let Some(filename) = &info.filename {
                            println!("file:         {}", filename);
                        }
                        if let Some(added) = info.added {
                            println!("added:        {}", added.to_rfc3339());
                        }
                        if let Some(last_updated) = info.last_updated {
                            println!("last updated: {}", last_updated.to_rfc3339());
                        }
                        println!("pages:        {}", info.nr_pages);
                        println!(
                            "annotations:  {} ({} comments, {} notes, {} flashcards, \
                             {} text highlights, {} area highlights)",
                            info.nr_annotations,
                            info.nr_comments,
                            info.nr_notes,
                            info.nr_flashcards,
                            info.nr_text_highlights,
                            info.nr_area_highlights
                        );

                        let annotated: Vec<String> = doc
                            .page_metas
                            .values()
                            .filter(|page| page.annotation_count() > 0)
                            .map(|page| {
                                format!("p{} ({})", page.page_info.num, page.annotation_count())
                            })
                            .collect();
                        if !annotated.is_empty() {
                            println!("annotated on: {}", annotated.join(", "));
                        }
                    }
                }
                Ok(())
            }

            DocSubcommand::Annotate {
                fingerprint,
                page,
                kind,
                text,
            } => {
                let mut doc = layer
                    .get_doc_meta(fingerprint)
                    .await?
                    .ok_or_else(|| format!("Document not found: {}", fingerprint))?;

                let page_meta = doc
                    .page_metas
                    .get_mut(page)
                    .ok_or_else(|| format!("No page {} in document", page))?;

                let annotation = json!({
                    "id": Uuid::new_v4().to_string(),
                    "created": chrono::Utc::now().to_rfc3339(),
                    "text": text,
                });
                let id = annotation["id"].as_str().unwrap_or_default().to_string();

                let target = match kind {
                    AnnotationKind::Comment => &mut page_meta.comments,
                    AnnotationKind::Note => &mut page_meta.notes,
                    AnnotationKind::Flashcard => &mut page_meta.flashcards,
                    AnnotationKind::TextHighlight => &mut page_meta.text_highlights,
                    AnnotationKind::AreaHighlight => &mut page_meta.area_highlights,
                };
                target.insert(id, annotation);

                let doc_info = layer.write_doc_meta(&doc, None).await?;
                println!(
                    "Annotated page {}. Document now has {} annotation(s).",
                    page, doc_info.nr_annotations
                );
                Ok(())
            }

            DocSubcommand::Delete { fingerprint, force } => {
                let doc = layer
                    .get_doc_meta(fingerprint)
                    .await?
                    .ok_or_else(|| format!("Document not found: {}", fingerprint))?;

                if !force {
                    let title = doc.doc_info.title.as_deref().unwrap_or(fingerprint);
                    print!("Delete document '{}'? [y/N] ", title);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                let result = layer
                    .delete(&DocMetaFileRef {
                        fingerprint: fingerprint.clone(),
                        doc_file: doc.doc_info.filename.as_deref().map(FileRef::new),
                    })
                    .await?;

                if result.doc_meta_deleted {
                    println!("Deleted document: {}", fingerprint);
                } else {
                    println!("Nothing to delete for: {}", fingerprint);
                }
                Ok(())
            }
        }
    }
}

fn short_fingerprint(fingerprint: &str) -> String {
    if fingerprint.len() > 16 {
        format!("{}...", &fingerprint[..13])
    } else {
        fingerprint.to_string()
    }
}
