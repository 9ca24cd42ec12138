mod executor;
mod legacy;
mod node;
mod pipeline;
mod record;
mod tree;
mod version;

pub use executor::{ExecuteOptions, RunContext};
pub use legacy::{import_legacy, LegacyCategory, TemplateGroup, LEGACY_TEMPLATE, LEGACY_TITLE};
pub use node::*;
pub use pipeline::{LoosePipeline, PIPELINE_TITLE};
pub use record::{NodeRecord, LOAD_ERROR_TARGET};
pub use tree::{NodeTree, PivotList};
pub use version::*;
