pub mod ability;
pub mod concept_graph;
pub mod engagement;
pub mod plan;
pub mod scheduler;
pub mod tutor;
pub mod verification;
