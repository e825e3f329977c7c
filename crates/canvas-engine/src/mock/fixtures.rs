//! Built-in templates served by the mock engine

use canvas_model::{
    Edge, Graph, Node, NodeKind, Seed, TemplateDetail, TemplateList, TemplateSummary,
};

/// Schema tag of the template listing
pub const TEMPLATE_LIST_SCHEMA: &str = "template-list.v1";

/// Units reported by every mock result range
pub const RESULT_UNITS: &str = "GBP";

fn summary(id: &str, name: &str, description: &str) -> TemplateSummary {
    TemplateSummary {
        id: id.to_string(),
        name: name.to_string(),
        version: "1.0.0".to_string(),
        description: description.to_string(),
    }
}

fn pricing() -> TemplateDetail {
    TemplateDetail {
        summary: summary(
            "pricing-v1",
            "Pricing change",
            "Should we raise the subscription price?",
        ),
        default_seed: Seed::DEFAULT,
        graph: Graph::new(
            vec![
                Node::new("goal", NodeKind::Goal, "Grow revenue").at(0.0, 0.0),
                Node::new("decision", NodeKind::Decision, "Raise price by 10%").at(0.0, 120.0),
                Node::new("demand", NodeKind::Factor, "Price elasticity").at(-160.0, 240.0),
                Node::new("churn", NodeKind::Risk, "Customer churn").at(160.0, 240.0),
                Node::new("revenue", NodeKind::Outcome, "Monthly revenue").at(0.0, 360.0),
            ],
            vec![
                Edge::new("e1", "decision", "goal"),
                Edge::new("e2", "demand", "decision").with_weight(0.6),
                Edge::new("e3", "churn", "decision").with_weight(0.4),
                Edge::new("e4", "decision", "revenue"),
            ],
        ),
    }
}

fn hiring() -> TemplateDetail {
    TemplateDetail {
        summary: summary(
            "hiring-v1",
            "Hiring plan",
            "Hire two engineers now or one next quarter?",
        ),
        default_seed: Seed(2024),
        graph: Graph::new(
            vec![
                Node::new("decision", NodeKind::Decision, "Hiring plan").at(0.0, 0.0),
                Node::new("now", NodeKind::Option, "Hire two now").at(-140.0, 120.0),
                Node::new("later", NodeKind::Option, "Hire one next quarter").at(140.0, 120.0),
                Node::new("runway", NodeKind::Risk, "Cash runway").at(0.0, 240.0),
                Node::new("velocity", NodeKind::Outcome, "Delivery velocity").at(0.0, 360.0),
            ],
            vec![
                Edge::new("e1", "decision", "now"),
                Edge::new("e2", "decision", "later"),
                Edge::new("e3", "now", "runway").with_weight(0.7),
                Edge::new("e4", "later", "velocity").with_weight(0.5),
                Edge::new("e5", "runway", "velocity"),
            ],
        ),
    }
}

fn launch() -> TemplateDetail {
    TemplateDetail {
        summary: summary(
            "launch-v1",
            "Product launch",
            "Launch in spring or wait for the autumn release?",
        ),
        default_seed: Seed(7),
        graph: Graph::new(
            vec![
                Node::new("decision", NodeKind::Decision, "Launch timing").at(0.0, 0.0),
                Node::new("market", NodeKind::Factor, "Market readiness").at(-150.0, 120.0),
                Node::new("competitor", NodeKind::Risk, "Competitor release").at(150.0, 120.0),
                Node::new("share", NodeKind::Outcome, "Market share").at(0.0, 240.0),
            ],
            vec![
                Edge::new("e1", "market", "decision").with_weight(0.8),
                Edge::new("e2", "competitor", "decision").with_weight(0.3),
                Edge::new("e3", "decision", "share"),
            ],
        ),
    }
}

/// Every built-in template, in listing order
#[must_use]
pub fn templates() -> Vec<TemplateDetail> {
    vec![pricing(), hiring(), launch()]
}

/// Listing of the built-in templates
#[must_use]
pub fn template_list() -> TemplateList {
    TemplateList {
        schema: TEMPLATE_LIST_SCHEMA.to_string(),
        items: templates().into_iter().map(|t| t.summary).collect(),
    }
}

/// Built-in template by id
#[must_use]
pub fn template(id: &str) -> Option<TemplateDetail> {
    templates().into_iter().find(|t| t.summary.id == id)
}
