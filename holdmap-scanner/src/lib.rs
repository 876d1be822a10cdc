pub mod crawler;
pub mod error;
pub mod graph;
pub mod identity;
pub mod result;
pub mod source;

pub use crawler::{Crawler, ProgressCallback, QualificationFilter};
pub use error::CrawlError;
pub use graph::{ExpansionState, GraphStore};
pub use identity::Identity;
pub use result::CrawlResult;
pub use source::{DataSource, PartnerQuery};
