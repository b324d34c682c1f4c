use super::filter::{sort_by_recency, ResourceFilter};
use super::Registry;
use crate::config::RegistryConfig;
use crate::envelope::Labels;
use crate::error::RegistryError;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};

/// Free-text search on top of a [`ResourceFilter`].
///
/// `query` is split on whitespace and every token must match. A `key:value`
/// token matches a label or tag exactly (value compared case-insensitively);
/// any other token is a case-insensitive substring of the ID, name, display
/// name, or a label/tag key or value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSearchQuery {
    pub query: String,
    pub filter: ResourceFilter,
    /// 0 means the configured default. Signed so that bad input can be
    /// rejected at the boundary instead of wrapping.
    pub limit: i64,
    pub offset: i64,
}

/// Pagination after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub limit: usize,
    pub offset: usize,
}

impl ResourceSearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    pub fn with_filter(mut self, filter: ResourceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn validate(&self, config: &RegistryConfig) -> Result<SearchParams, RegistryError> {
        if self.limit < 0 {
            return Err(RegistryError::InvalidFilterCriteria(format!("limit must be >= 0, got {}", self.limit)));
        }
        if self.offset < 0 {
            return Err(RegistryError::InvalidFilterCriteria(format!("offset must be >= 0, got {}", self.offset)));
        }
        let limit = match usize::try_from(self.limit).unwrap_or(usize::MAX) {
            0 => config.search_default_limit,
            n => n.min(config.search_max_limit),
        };
        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        Ok(SearchParams { limit, offset })
    }
}

impl Registry {
    /// Filtered records matching `query`, best matches first, then most
    /// recently seen. An empty query behaves like [`Registry::filter`].
    pub fn search(&self, query: &ResourceSearchQuery) -> Result<Vec<Resource>, RegistryError> {
        let params = query.validate(self.config())?;
        let tokens: Vec<Token> = query.query.split_whitespace().map(Token::parse).collect();

        let mut scored: Vec<(u32, Resource)> = self
            .filter(&query.filter)
            .into_iter()
            .filter_map(|r| score(&tokens, &r).map(|s| (s, r)))
            .collect();

        if tokens.is_empty() {
            let mut plain: Vec<Resource> = scored.into_iter().map(|(_, r)| r).collect();
            sort_by_recency(&mut plain);
            return Ok(paginate(plain, params));
        }

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(paginate(scored.into_iter().map(|(_, r)| r).collect(), params))
    }
}

enum Token {
    Pair { key: String, value: String },
    Text(String),
}

impl Token {
    fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => Token::Pair {
                key: key.to_string(),
                value: value.to_lowercase(),
            },
            _ => Token::Text(raw.to_lowercase()),
        }
    }
}

/// Sum of token scores, `None` as soon as one token does not match.
fn score(tokens: &[Token], r: &Resource) -> Option<u32> {
    tokens.iter().try_fold(0u32, |acc, token| {
        let s = token_score(token, r);
        (s > 0).then_some(acc + s)
    })
}

fn token_score(token: &Token, r: &Resource) -> u32 {
    match token {
        Token::Pair { key, value } => {
            let hit = |map: &Labels| map.get(key).is_some_and(|v| v.to_lowercase() == *value);
            if hit(&r.labels) || hit(&r.tags) {
                3
            } else {
                // "10.0.0.5:9100" and friends are plain text, not pairs.
                let raw = format!("{key}:{value}");
                text_score(&raw.to_lowercase(), r)
            }
        }
        Token::Text(text) => text_score(text, r),
    }
}

fn text_score(text: &str, r: &Resource) -> u32 {
    let name = r.name.to_lowercase();
    if name == text {
        return 5;
    }
    if name.contains(text) || r.display_name.to_lowercase().contains(text) {
        return 4;
    }
    if r.id.to_lowercase().contains(text) {
        return 2;
    }
    let in_map = |map: &Labels| {
        map.iter()
            .any(|(k, v)| k.to_lowercase().contains(text) || v.to_lowercase().contains(text))
    };
    if in_map(&r.labels) || in_map(&r.tags) {
        return 1;
    }
    0
}

fn paginate(items: Vec<Resource>, params: SearchParams) -> Vec<Resource> {
    items.into_iter().skip(params.offset).take(params.limit).collect()
}
