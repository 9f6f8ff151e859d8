use std::sync::Arc;

/// Matcher 抽象接口：决定一条记录的 title 是否进入初始 frontier
pub trait Matcher: Send + Sync {
    fn matches(&self, title: &str) -> bool;
}

/// 精确包含匹配：区分大小写，不做任何规范化
pub struct ExactMatcher {
    pattern: String,
}

impl ExactMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }
}

impl Matcher for ExactMatcher {
    fn matches(&self, title: &str) -> bool {
        title.contains(&self.pattern)
    }
}

pub fn create_matcher(keyword: &str) -> Arc<dyn Matcher> {
    Arc::new(ExactMatcher::new(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_is_case_sensitive() {
        let m = create_matcher("Graph");
        assert!(m.matches("Deep Graph Networks"));
        assert!(m.matches("Graphs"));
        assert!(!m.matches("deep graph networks"));
        assert!(!m.matches(""));
    }
}
