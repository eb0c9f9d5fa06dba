pub fn study_set_key(set_id: &str) -> String {
    set_id.to_string()
}

pub fn study_set_user_index(user_id: &str, set_id: &str) -> String {
    format!("user:{}:{}", user_id, set_id)
}

pub fn study_set_user_prefix(user_id: &str) -> String {
    format!("user:{}:", user_id)
}

// Term keys: rank 补零后按作者顺序排列
pub fn term_key(set_id: &str, rank: i64, term_id: &str) -> String {
    let ordered = (rank as u64) ^ (1u64 << 63);
    format!("{}:{:020}:{}", set_id, ordered, term_id)
}

pub fn term_prefix(set_id: &str) -> String {
    format!("{}:", set_id)
}

// Studiable term keys
pub fn studiable_term_key(user_id: &str, set_id: &str, mode: &str, term_id: &str) -> String {
    format!("{}:{}:{}:{}", user_id, set_id, mode, term_id)
}

pub fn studiable_term_prefix(user_id: &str, set_id: &str, mode: &str) -> String {
    format!("{}:{}:{}:", user_id, set_id, mode)
}

pub fn studiable_term_set_prefix(user_id: &str, set_id: &str) -> String {
    format!("{}:{}:", user_id, set_id)
}

// Container keys
pub fn container_key(user_id: &str, set_id: &str) -> String {
    format!("{}:{}", user_id, set_id)
}
