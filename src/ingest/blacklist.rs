//! URL and query filters applied before events reach the graph

use regex::Regex;

use crate::error::Result;

/// Compiled blacklist. Page loads whose URL matches any URL pattern are
/// ignored; queries equal to a listed query on a matching URL are dropped.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    urls: Vec<Regex>,
    queries: Vec<(String, Regex)>,
}

impl Blacklist {
    pub fn new<S: AsRef<str>>(url_patterns: &[S], queries: &[(S, S)]) -> Result<Self> {
        let urls = url_patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let queries = queries
            .iter()
            .map(|(query, url)| -> Result<(String, Regex)> {
                Ok((query.as_ref().to_string(), Regex::new(url.as_ref())?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { urls, queries })
    }

    pub fn is_url_blacklisted(&self, url: &str) -> bool {
        self.urls.iter().any(|re| re.is_match(url))
    }

    pub fn is_query_blacklisted(&self, query: &str, url: &str) -> bool {
        self.queries
            .iter()
            .any(|(blocked, re)| blocked == query && re.is_match(url))
    }
}
