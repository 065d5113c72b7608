use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use classify_common::embedding::Embedder;
use classify_common::openai::{OpenAiClient, OpenAiClientConfig};
use classify_common::redis::RedisCache;
use classify_common::vectordb::VectorDb;
use line_classifier::category::CategoryTree;
use line_classifier::classifier::Classifier;
use line_classifier::config::{Config, Strategy};
use line_classifier::index::{IndexCache, IndexService, CATEGORY_TABLE};
use line_classifier::llm::{LlmClassifier, OpenAiGenerator};
use line_classifier::loader;
use line_classifier::render::ascii_tree;
use line_classifier::sample::{build_sample_hierarchy, sample_line_items};
use line_classifier::traversal::classify_path;
use line_classifier::vector::{LanceIndex, VectorClassifier};

struct LineItem {
    text: String,
    expected: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::from_env()?;
    info!(
        strategy = ?config.strategy,
        hierarchy = ?config.hierarchy_path,
        redis = config.redis_url.is_some(),
        "configuration loaded"
    );

    let tree = match &config.hierarchy_path {
        Some(path) => loader::load_file(path, config.hierarchy_format).await?,
        None => build_sample_hierarchy()?,
    };
    info!(categories = tree.len(), depth = tree.depth(), "hierarchy ready");

    println!("Hierarchy:");
    print!("{}", ascii_tree(&tree));

    let classifier = build_classifier(&config, &tree).await?;
    let items = line_items(&config).await?;

    println!("\n=== Line Items and Classification Paths ===");
    let mut matched = 0;
    let mut labelled = 0;
    for item in &items {
        let path = classify_path(&tree, tree.root(), &item.text, classifier.as_ref()).await?;
        let result = path.names(&tree);

        println!("Line Item: '{}'", item.text);
        if let Some(expected) = &item.expected {
            println!("  Expected Path: {expected:?}");
            labelled += 1;
            if expected.iter().map(String::as_str).eq(result.iter().copied()) {
                matched += 1;
            }
        }
        println!("  Result: {result:?}");
        for warning in path.warnings() {
            println!("  Warning: {warning}");
        }
    }

    info!(items = items.len(), labelled, matched, "classification run complete");
    Ok(())
}

async fn build_classifier(
    config: &Config,
    tree: &CategoryTree,
) -> anyhow::Result<Box<dyn Classifier>> {
    match &config.strategy {
        Strategy::Llm => {
            let client = Arc::new(OpenAiClient::new(OpenAiClientConfig::from_env())?);
            info!(
                model = %config.model,
                base_url = %client.config().base_url,
                "using generation classifier"
            );
            let generator = OpenAiGenerator::new(client, &config.model, config.temperature);
            Ok(Box::new(LlmClassifier::new(Arc::new(generator))))
        }
        Strategy::Vector { lancedb_path } => {
            // Redis is optional; without it every start re-indexes.
            let redis = RedisCache::new(config.redis_url.as_deref());
            if redis.is_available().await {
                info!("redis connected");
            } else {
                info!("redis unavailable, running without fingerprint cache");
            }
            let cache = Arc::new(IndexCache::new(redis));

            info!("initializing embedding model (may download on first run)");
            let embedder = Arc::new(Embedder::new().await?);
            let vectordb = Arc::new(VectorDb::connect(lancedb_path).await?);
            info!(path = %lancedb_path, "lancedb connected");

            let service = IndexService::new(
                Arc::clone(&embedder),
                Arc::clone(&vectordb),
                cache,
                CATEGORY_TABLE,
            );
            let report = service.ensure_indexed(tree, config.force_reindex).await?;
            info!(
                updated = report.updated,
                documents = report.document_count,
                fingerprint = %report.fingerprint,
                "category index ready"
            );

            let index = LanceIndex::new(embedder, vectordb, service.table());
            Ok(Box::new(VectorClassifier::new(Arc::new(index))))
        }
    }
}

async fn line_items(config: &Config) -> anyhow::Result<Vec<LineItem>> {
    let Some(path) = &config.line_items_path else {
        return Ok(sample_line_items()
            .into_iter()
            .map(|item| LineItem {
                text: item.text.to_string(),
                expected: Some(item.expected.iter().map(|s| s.to_string()).collect()),
            })
            .collect());
    };

    let text = tokio::fs::read_to_string(path).await?;
    let items: Vec<LineItem> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| LineItem {
            text: l.to_string(),
            expected: None,
        })
        .collect();
    info!(path = %path.display(), items = items.len(), "line items loaded");
    Ok(items)
}
