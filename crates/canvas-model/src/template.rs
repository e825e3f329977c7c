//! Analysis templates

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::request::Seed;

/// Template listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    /// Template id
    pub id: String,
    /// Display name
    pub name: String,
    /// Template version
    pub version: String,
    /// Short description
    #[serde(default)]
    pub description: String,
}

/// Full template with its starter graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDetail {
    /// Listing fields
    #[serde(flatten)]
    pub summary: TemplateSummary,
    /// Seed used when a request carries none
    pub default_seed: Seed,
    /// Starter graph
    pub graph: Graph,
}

/// Template listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateList {
    /// Listing schema tag
    pub schema: String,
    /// Templates
    pub items: Vec<TemplateSummary>,
}
