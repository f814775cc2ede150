//! Scripted `QueryClient` for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

use super::{QueryClient, QueryResult, QueryValue, Sample};
use crate::error::{MeshGraphError, Result};

enum Reply {
    Value(QueryValue),
    Fail(String),
}

struct Rule {
    pattern: String,
    reply: Reply,
}

/// Answers each query with the first rule whose pattern is a substring of the
/// expression; unmatched queries get an empty vector.
#[derive(Default)]
pub struct FakeQueryClient {
    rules: Vec<Rule>,
    delays: Vec<(String, Duration)>,
    issued: Mutex<Vec<String>>,
}

impl FakeQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: &str, value: QueryValue) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            reply: Reply::Value(value),
        });
        self
    }

    pub fn on_vector(self, pattern: &str, samples: Vec<Sample>) -> Self {
        self.on(pattern, QueryValue::Vector(samples))
    }

    pub fn fail(mut self, pattern: &str, message: &str) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            reply: Reply::Fail(message.to_string()),
        });
        self
    }

    pub fn delay(mut self, pattern: &str, delay: Duration) -> Self {
        self.delays.push((pattern.to_string(), delay));
        self
    }

    /// Every expression queried so far, in call order.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryClient for FakeQueryClient {
    async fn query(&self, expr: &str, _at: DateTime<Utc>) -> Result<QueryResult> {
        self.issued.lock().unwrap().push(expr.to_string());

        if let Some((_, delay)) = self.delays.iter().find(|(p, _)| expr.contains(p.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        match self.rules.iter().find(|r| expr.contains(r.pattern.as_str())) {
            Some(Rule {
                reply: Reply::Value(value),
                ..
            }) => Ok(QueryResult::new(value.clone())),
            Some(Rule {
                reply: Reply::Fail(message),
                ..
            }) => Err(MeshGraphError::Query(message.clone())),
            None => Ok(QueryResult::new(QueryValue::Vector(Vec::new()))),
        }
    }
}
