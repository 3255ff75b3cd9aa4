use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use dedupe_lib::clustering::{find_all_company_duplicates, find_all_contact_duplicates, ClusterRequest};
use dedupe_lib::matching::candidates::{CompanySearch, ContactSearch};
use dedupe_lib::matching::{find_company_duplicates, find_contact_duplicates, CompanyProbe, ContactProbe};
use dedupe_lib::merge::{merge_companies, merge_contacts};
use dedupe_lib::models::{
    CompanyData, CompanyId, CompanyMergeRequest, ContactData, ContactId, ContactMergeRequest,
};
use dedupe_lib::store::PgStore;
use dedupe_lib::utils::db_connect::{connect, get_pool_status};
use dedupe_lib::utils::dedupe_config::DedupeConfig;
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::progress_bars::progress_config::ProgressConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Contacts,
    Companies,
}

#[derive(Subcommand)]
enum Command {
    /// Rank likely duplicates of one contact or of raw contact fields
    FindContacts {
        #[arg(long)]
        source_id: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Rank likely duplicates of one company or of raw company fields
    FindCompanies {
        #[arg(long)]
        source_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Group a whole collection into duplicate groups
    Cluster {
        #[arg(value_enum)]
        kind: Kind,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Merge duplicate contacts into a primary
    MergeContacts {
        #[arg(long)]
        primary: String,
        /// Comma-separated duplicate ids
        #[arg(long, value_delimiter = ',', required = true)]
        duplicates: Vec<String>,
        /// Merged field values as JSON, e.g. '{"lastName":"Doe"}'
        #[arg(long)]
        data: String,
    },
    /// Merge duplicate companies into a primary
    MergeCompanies {
        #[arg(long)]
        primary: String,
        #[arg(long, value_delimiter = ',', required = true)]
        duplicates: Vec<String>,
        #[arg(long)]
        data: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let cli = Cli::parse();
    let start = Instant::now();

    let config = DedupeConfig::from_env();
    config.log_config();
    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    let pool = connect().await.context("Failed to connect to database")?;
    let (connections, idle) = get_pool_status(&pool);
    info!("Database pool ready ({} connections, {} idle)", connections, idle);
    let store = PgStore::new(pool);

    match cli.command {
        Command::FindContacts {
            source_id,
            first_name,
            last_name,
            email,
            phone,
            limit,
            min_confidence,
        } => {
            let request = ContactSearch {
                source_id: source_id.map(ContactId::from),
                fields: ContactProbe {
                    first_name,
                    last_name,
                    email,
                    phone,
                },
                limit,
                min_confidence,
            };
            let matches = find_contact_duplicates(&store, &request, &config)
                .await
                .context("Contact duplicate search failed")?;
            print_json(&matches)?;
        }
        Command::FindCompanies {
            source_id,
            name,
            domain,
            website,
            phone,
            limit,
            min_confidence,
        } => {
            let request = CompanySearch {
                source_id: source_id.map(CompanyId::from),
                fields: CompanyProbe {
                    name,
                    domain,
                    website,
                    phone,
                },
                limit,
                min_confidence,
            };
            let matches = find_company_duplicates(&store, &request, &config)
                .await
                .context("Company duplicate search failed")?;
            print_json(&matches)?;
        }
        Command::Cluster {
            kind,
            limit,
            min_confidence,
        } => {
            let request = ClusterRequest {
                limit,
                min_confidence,
            };
            let multi_progress = progress_config.cluster_progress();
            match kind {
                Kind::Contacts => {
                    let groups =
                        find_all_contact_duplicates(&store, request, &config, multi_progress)
                            .await
                            .context("Contact cluster pass failed")?;
                    print_json(&groups)?;
                }
                Kind::Companies => {
                    let groups =
                        find_all_company_duplicates(&store, request, &config, multi_progress)
                            .await
                            .context("Company cluster pass failed")?;
                    print_json(&groups)?;
                }
            }
        }
        Command::MergeContacts {
            primary,
            duplicates,
            data,
        } => {
            let merged_data: ContactData =
                serde_json::from_str(&data).context("Invalid --data for contact merge")?;
            let request = ContactMergeRequest {
                primary_id: ContactId::from(primary),
                duplicate_ids: duplicates.into_iter().map(ContactId::from).collect(),
                merged_data,
            };
            let id = merge_contacts(&store, &request)
                .await
                .context("Contact merge failed")?;
            print_json(&json!({ "primaryId": id, "mergedIds": request.duplicate_ids }))?;
        }
        Command::MergeCompanies {
            primary,
            duplicates,
            data,
        } => {
            let merged_data: CompanyData =
                serde_json::from_str(&data).context("Invalid --data for company merge")?;
            let request = CompanyMergeRequest {
                primary_id: CompanyId::from(primary),
                duplicate_ids: duplicates.into_iter().map(CompanyId::from).collect(),
                merged_data,
            };
            let id = merge_companies(&store, &request)
                .await
                .context("Company merge failed")?;
            print_json(&json!({ "primaryId": id, "mergedIds": request.duplicate_ids }))?;
        }
    }

    info!("Done in {:.2?}", start.elapsed());
    Ok(())
}
