pub mod builder;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod engine;
pub mod ir;
pub mod layout;

pub use builder::{EdgeIdCounter, build_graph};
pub use cache::{LayoutCache, StructuralKey, structural_key};
#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, StrategyKind, load_config};
pub use engine::LayoutEngine;
pub use ir::{Direction, Graph, SystemData};
pub use layout::{
    ConcentricLayout, HierarchicalLayout, Layout, LayoutError, LayoutStrategy, compute_layout,
};

/// Parses a system description and lays it out with `config`, uncached.
pub fn layout_json(input: &str, config: &LayoutConfig) -> anyhow::Result<Layout> {
    let data = SystemData::from_json(input)?;
    let engine = LayoutEngine::new(config.clone());
    Ok(engine.layout_sync(&data)?)
}
