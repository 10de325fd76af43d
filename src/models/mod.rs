mod article;
mod usage;

pub use article::{Article, ArticleSummary, NewArticle};
pub use usage::{TokenUsage, UsageRecord};
