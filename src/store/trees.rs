pub const STUDY_SETS: &str = "study_sets";
pub const TERMS: &str = "terms";
pub const STUDIABLE_TERMS: &str = "studiable_terms";
pub const CONTAINERS: &str = "containers";
pub const CONFIG_VERSIONS: &str = "config_versions";
