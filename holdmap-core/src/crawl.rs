use crate::data::Database;
use holdmap_scanner::graph::Node;
use holdmap_scanner::result::{CrawlResult, DiagnosticKind};
use holdmap_scanner::{CrawlError, Crawler, DataSource, Identity, PartnerQuery, QualificationFilter};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::warn;

const COMPANY_TAX_ID_LEN: usize = 14;

/// Where a crawl starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// A known root, company or person.
    Identity(Identity),
    /// Every partner matching a tax id or a name.
    Search(PartnerQuery),
}

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub seeds: Vec<Seed>,
    pub max_depth: usize,
    pub qualifications: QualificationFilter,
    pub timeout: Option<Duration>,
    pub show_progress_bars: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_depth: 1,
            qualifications: QualificationFilter::All,
            timeout: None,
            show_progress_bars: false,
        }
    }
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

fn digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Parse one seed line.
///
/// Accepted forms: `PJ:<cnpj>`, `PF:<cpf>:<name>`, `SEARCH:<tax id or name>`
/// and a bare 14 digit CNPJ. Blank lines and `#` comments yield `None`.
pub fn parse_seed_line(line: &str) -> Option<Seed> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let (prefix, rest) = match trimmed.split_once(':') {
        Some((prefix, rest)) => (prefix.trim().to_uppercase(), rest.trim()),
        None => (String::new(), trimmed),
    };

    match prefix.as_str() {
        "PJ" => {
            let tax_id = digits(rest);
            if tax_id.is_empty() {
                warn!("Skipping company seed without a tax id: {}", trimmed);
                return None;
            }
            Some(Seed::Identity(Identity::legal_entity(tax_id)))
        }
        "PF" => {
            // The masked CPF keeps its asterisks, the name may contain ':'
            let Some((tax_id, name)) = rest.split_once(':') else {
                warn!("Skipping person seed without a name: {}", trimmed);
                return None;
            };
            let name = name.trim();
            if name.is_empty() {
                warn!("Skipping person seed without a name: {}", trimmed);
                return None;
            }
            Some(Seed::Identity(Identity::natural_person(tax_id.trim(), name.to_uppercase())))
        }
        "SEARCH" if !rest.is_empty() => Some(Seed::Search(PartnerQuery::parse(rest))),
        "" if digits(rest).len() == COMPANY_TAX_ID_LEN
            && rest.chars().all(|c| c.is_ascii_digit() || ".-/".contains(c)) =>
        {
            Some(Seed::Identity(Identity::legal_entity(digits(rest))))
        }
        _ => {
            warn!("Skipping invalid seed: {}", trimmed);
            None
        }
    }
}

/// Run every seed through one crawler over `source`, sharing the graph.
///
/// A cancelled crawl still returns the partial result with `cancelled` set.
pub fn crawl_source<S: DataSource>(
    source: S,
    options: CrawlOptions,
    cancel_flag: Arc<AtomicBool>,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlResult, String> {
    let CrawlOptions {
        seeds,
        max_depth,
        qualifications,
        timeout,
        show_progress_bars,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .map_err(|e| e.to_string())?;
        pb.set_style(style);
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let visited = Arc::new(AtomicUsize::new(0));

    let internal_progress_callback: holdmap_scanner::ProgressCallback = match progress_bar.clone() {
        Some(pb) => {
            let visited = visited.clone();
            Arc::new(move |depth: usize, key: String| {
                let count = visited.fetch_add(1, Ordering::Relaxed) + 1;
                pb.set_message(format!("Crawling... {} visits, depth {} {}", count, depth, key));
                pb.tick();
            })
        }
        None => {
            let visited = visited.clone();
            Arc::new(move |_depth: usize, _key: String| {
                visited.fetch_add(1, Ordering::Relaxed);
            })
        }
    };

    let mut crawler = Crawler::new(source)
        .with_max_depth(max_depth)
        .with_qualifications(qualifications)
        .with_cancel_flag(cancel_flag)
        .with_progress_callback(internal_progress_callback);
    if let Some(timeout) = timeout {
        crawler = crawler.with_timeout(timeout);
    }

    for (idx, seed) in seeds.iter().enumerate() {
        if let Some(ref callback) = progress_callback
            && seeds.len() > 1
        {
            callback(format!("Crawling seed {}/{}: {}", idx + 1, seeds.len(), describe_seed(seed)));
        }

        let outcome = match seed {
            Seed::Identity(identity) => crawler.insert(identity),
            Seed::Search(query) => match crawler.insert_by_tax_id_or_name(query) {
                Ok(0) => {
                    if let Some(ref callback) = progress_callback {
                        callback(format!("[!]  No partner found matching '{}'", query.value()));
                    }
                    Ok(())
                }
                other => other.map(|_| ()),
            },
        };

        match outcome {
            Ok(()) => {}
            Err(CrawlError::Cancelled) => {
                if let Some(ref callback) = progress_callback {
                    callback("[!]  Crawl cancelled, keeping partial graph".to_string());
                }
                break;
            }
            Err(e) => {
                if let Some(ref pb) = progress_bar {
                    pb.abandon_with_message("Crawl aborted");
                }
                return Err(e.to_string());
            }
        }
    }

    if let Some(ref pb) = progress_bar {
        let total = visited.load(Ordering::Relaxed);
        pb.finish_with_message(format!("Crawl complete! {} visits", total));
    }

    Ok(crawler.into_result())
}

/// Execute a crawl against the registry database at `db_path`.
///
/// The crawl runs on a blocking thread; Ctrl-C raises the cancel flag and the
/// partial result is returned.
pub async fn execute_crawl(
    db_path: PathBuf,
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlResult, String> {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let worker_flag = cancel_flag.clone();

    let handle = tokio::task::spawn_blocking(move || {
        let db = Database::new(&db_path)
            .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))?;
        crawl_source(db, options, worker_flag, progress_callback)
    });

    let joined = await_with_interrupt(handle, tokio::signal::ctrl_c(), &cancel_flag).await;

    joined.map_err(|e| format!("Crawl task failed: {}", e))?
}

/// Wait for `task`, raising `cancel_flag` once `interrupt` fires. A listener
/// that fails to install is logged and the task runs to completion.
async fn await_with_interrupt<T, F>(
    mut task: JoinHandle<T>,
    interrupt: F,
    cancel_flag: &AtomicBool,
) -> Result<T, JoinError>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        joined = &mut task => joined,
        signal = interrupt => {
            match signal {
                Ok(()) => {
                    warn!("Interrupt received, stopping crawl");
                    cancel_flag.store(true, Ordering::Relaxed);
                }
                Err(e) => warn!("Cannot listen for Ctrl-C, crawl runs to completion: {}", e),
            }
            task.await
        }
    }
}

fn describe_seed(seed: &Seed) -> String {
    match seed {
        Seed::Identity(identity) => identity.to_string(),
        Seed::Search(query) => format!("search '{}'", query.value()),
    }
}

fn node_label(node: &Node) -> String {
    match node.display_name {
        Some(ref name) => format!("{} {}", node.identity.tax_id(), name),
        None => node.identity.tax_id().to_string(),
    }
}

/// Generate a crawl report from results
pub fn generate_crawl_report(result: &CrawlResult) -> String {
    let graph = &result.graph;
    let companies = graph.iter_nodes().filter(|n| n.identity.is_legal_entity()).count();
    let persons = graph.node_count() - companies;

    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Nodes: {}\n", graph.node_count()));
    report.push_str(&format!("    Companies: {}\n", companies));
    report.push_str(&format!("    Persons: {}\n", persons));
    report.push_str(&format!("  Ownership edges: {}\n", graph.edge_count()));
    report.push_str(&format!(
        "  Source calls: {} attribute, {} relation, {} search\n",
        result.stats.attribute_fetches, result.stats.relation_fetches, result.stats.partner_searches
    ));
    report.push_str(&format!("  Elapsed: {:.2}s\n", result.elapsed.as_secs_f64()));
    if result.cancelled {
        report.push_str("  Status: cancelled (partial graph)\n");
    }

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    let mut by_depth: BTreeMap<usize, Vec<&Node>> = BTreeMap::new();
    for node in graph.iter_nodes() {
        by_depth.entry(node.depth).or_default().push(node);
    }

    for (depth, nodes) in &by_depth {
        report.push_str(&format!("## Depth {}\n", depth));
        report.push_str(&format!("  {} nodes\n\n", nodes.len()));

        for node in nodes {
            let tag = if node.identity.is_legal_entity() {
                "\x1b[34mPJ\x1b[0m"
            } else {
                "\x1b[32mPF\x1b[0m"
            };
            report.push_str(&format!(
                "  {} {} \x1b[90m{}\x1b[0m\n",
                tag,
                node_label(node),
                node.expansion_state.as_str()
            ));
        }
        report.push('\n');
    }

    if !result.diagnostics.is_empty() {
        report.push_str("## Diagnostics\n");
        for diagnostic in &result.diagnostics {
            let kind = match diagnostic.kind {
                DiagnosticKind::NotFound => "\x1b[33mnot found\x1b[0m",
                DiagnosticKind::AdapterFailure => "\x1b[31mfailure\x1b[0m",
            };
            report.push_str(&format!("  {} {}: {}\n", kind, diagnostic.key, diagnostic.message));
        }
        report.push('\n');
    }

    report
}
