//! Study-plan assembly.
//!
//! The plan is a derived view: weekly milestones come from the review
//! schedule, module links come from the catalog. Catalog failure only
//! degrades the plan; it never blocks the workflow.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collaborators::{CatalogLookup, ModuleLink};
use crate::services::concept_graph::ConceptGraph;
use crate::services::scheduler::{self, ReviewRecord};

/// Slack added past the last review before the suggested exam date.
const EXAM_BUFFER_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWeek {
    pub week_index: u32,
    pub concept_ids: Vec<String>,
    pub modules: Vec<ModuleLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlan {
    pub certification_uid: String,
    pub created_at: DateTime<Utc>,
    pub weeks: Vec<PlanWeek>,
    pub total_days: i64,
    pub suggested_exam_date: DateTime<Utc>,
    /// Set when the catalog was unreachable and links were dropped.
    pub links_degraded: bool,
    /// Set when the verification gate could not vouch for the plan.
    pub unverified: bool,
}

impl StudyPlan {
    /// One-paragraph account of the plan, used as the claim text when the
    /// plan is submitted for verification.
    pub fn summary(&self) -> String {
        let concepts: usize = self.weeks.iter().map(|w| w.concept_ids.len()).sum();
        format!(
            "study plan for {} covering {} concepts across {} weeks, exam suggested in {} days",
            self.certification_uid,
            concepts,
            self.weeks.len(),
            self.total_days + EXAM_BUFFER_DAYS
        )
    }
}

/// Assembles the plan from the current schedule and graph. Module links
/// are fetched per frontier concept; on catalog failure the plan keeps
/// its structure with `links_degraded` set.
pub async fn assemble<C: CatalogLookup>(
    catalog: &C,
    certification_uid: &str,
    graph: &ConceptGraph,
    records: &HashMap<String, ReviewRecord>,
    now: DateTime<Utc>,
) -> StudyPlan {
    let buckets = scheduler::weekly_buckets(records, now);
    let total_days = records
        .values()
        .map(|r| (r.due_at - now).num_days().max(0))
        .max()
        .unwrap_or(0);

    let (mut links, links_degraded) = match catalog.find_modules(&graph.concept_queries()).await {
        Ok(links) => (links, false),
        Err(e) => {
            warn!(error = %e, "catalog unavailable, plan will omit module links");
            (HashMap::new(), true)
        }
    };

    // Within a week, study prerequisites before their dependents.
    let topo_position: HashMap<String, usize> = graph
        .topological_order()
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();

    let weeks = buckets
        .into_iter()
        .map(|bucket| {
            let mut concept_ids = bucket.concept_ids;
            concept_ids.sort_by_key(|id| topo_position.get(id).copied().unwrap_or(usize::MAX));
            let mut modules: Vec<ModuleLink> = concept_ids
                .iter()
                .flat_map(|id| links.remove(id).unwrap_or_default())
                .collect();
            modules.dedup_by(|a, b| a.url == b.url);
            PlanWeek { week_index: bucket.week_index, concept_ids, modules }
        })
        .collect();

    StudyPlan {
        certification_uid: certification_uid.to_string(),
        created_at: now,
        weeks,
        total_days,
        suggested_exam_date: now + Duration::days(total_days + EXAM_BUFFER_DAYS),
        links_degraded,
        unverified: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::MockCatalog;
    use crate::collaborators::Objective;
    use crate::services::ability::AbilityState;

    fn graph() -> ConceptGraph {
        let objectives: Vec<Objective> = (0..4)
            .map(|i| Objective {
                id: format!("obj-{i}"),
                name: format!("Area {i}"),
                description: String::new(),
                weight_percent: 25.0,
            })
            .collect();
        ConceptGraph::build(&objectives, &AbilityState::new(), &HashMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_plan_covers_all_scheduled_concepts() {
        let graph = graph();
        let now = Utc::now();
        let records = scheduler::schedule(&graph, now);
        let catalog = MockCatalog::with_default_outline();
        let plan = assemble(&catalog, "cert-x", &graph, &records, now).await;

        let planned: usize = plan.weeks.iter().map(|w| w.concept_ids.len()).sum();
        assert_eq!(planned, graph.len());
        assert!(!plan.links_degraded);
        assert!(plan.weeks.iter().any(|w| !w.modules.is_empty()));
        assert!(plan.suggested_exam_date > now);
    }

    #[tokio::test]
    async fn test_catalog_failure_degrades_links_only() {
        let graph = graph();
        let now = Utc::now();
        let records = scheduler::schedule(&graph, now);
        let plan = assemble(&MockCatalog::failing(), "cert-x", &graph, &records, now).await;

        assert!(plan.links_degraded);
        assert!(plan.weeks.iter().all(|w| w.modules.is_empty()));
        let planned: usize = plan.weeks.iter().map(|w| w.concept_ids.len()).sum();
        assert_eq!(planned, graph.len());
    }

    #[tokio::test]
    async fn test_weeks_order_prerequisites_first() {
        let graph = graph();
        let now = Utc::now();
        let records = scheduler::schedule(&graph, now);
        let catalog = MockCatalog::with_default_outline();
        let plan = assemble(&catalog, "cert-x", &graph, &records, now).await;

        let order = graph.topological_order();
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for week in &plan.weeks {
            let positions: Vec<usize> =
                week.concept_ids.iter().map(|id| position[id.as_str()]).collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn test_exam_date_includes_buffer() {
        let graph = graph();
        let now = Utc::now();
        let records = scheduler::schedule(&graph, now);
        let catalog = MockCatalog::with_default_outline();
        let plan = assemble(&catalog, "cert-x", &graph, &records, now).await;
        assert_eq!(
            plan.suggested_exam_date,
            now + Duration::days(plan.total_days + EXAM_BUFFER_DAYS)
        );
    }
}
