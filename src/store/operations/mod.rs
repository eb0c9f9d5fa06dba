pub mod containers;
pub mod studiable_terms;
pub mod study_sets;
