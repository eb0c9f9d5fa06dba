//! 学习集输入校验：只做长度与形状检查，不做内容过滤

use crate::constants::{MAX_DESC, MAX_TERM, MAX_TERMS_PER_SET, MAX_TITLE};

/// 标题去空白后非空，按字符计长度
pub fn validate_title(title: &str) -> Result<(), &'static str> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("title must not be empty");
    }
    if trimmed.chars().count() > MAX_TITLE {
        return Err("title is too long");
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), &'static str> {
    if description.chars().count() > MAX_DESC {
        return Err("description is too long");
    }
    Ok(())
}

/// word 与 definition 不能同时为空
pub fn validate_term_text(word: &str, definition: &str) -> Result<(), &'static str> {
    if word.trim().is_empty() && definition.trim().is_empty() {
        return Err("term word and definition must not both be empty");
    }
    if word.chars().count() > MAX_TERM || definition.chars().count() > MAX_TERM {
        return Err("term text is too long");
    }
    Ok(())
}

pub fn validate_term_count(count: usize) -> Result<(), &'static str> {
    if count == 0 {
        return Err("a study set needs at least one term");
    }
    if count > MAX_TERMS_PER_SET {
        return Err("too many terms in one study set");
    }
    Ok(())
}
