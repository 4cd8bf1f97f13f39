#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod layout;
pub mod layout_dump;
pub mod model;
pub mod parser;
pub mod relationship;
pub mod settings;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{GenerationConfig, LayoutConfig, load_config, parse_config};
pub use layout::{
    FamilyCluster, GenerationMap, Layout, LayoutNode, assign_generations, build_clusters,
    compute_layout, compute_layout_with, layout,
};
pub use model::{FamilyDocument, FamilyGraph, Gender, GraphError, Member, MemberId};
pub use parser::{load_family, parse_document, parse_family};
pub use relationship::{Relationship, RelationshipReport, path, relationship, relationship_report};
