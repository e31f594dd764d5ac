//! Training corpus records.
//!
//! Three kinds of knowledge feed retrieval and schema inference: question/SQL
//! pairs, DDL statements and free-form documentation. Each kind lives in its
//! own collection of the vector store.

use crate::error::{Result, Text2SqlError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingKind {
    QuestionSql,
    Ddl,
    Documentation,
}

impl TrainingKind {
    pub const ALL: [TrainingKind; 3] = [
        TrainingKind::QuestionSql,
        TrainingKind::Ddl,
        TrainingKind::Documentation,
    ];

    /// Collection name in the vector store.
    pub fn collection(&self) -> &'static str {
        match self {
            TrainingKind::QuestionSql => "sql",
            TrainingKind::Ddl => "ddl",
            TrainingKind::Documentation => "documentation",
        }
    }

    /// Suffix appended to record ids, so an id alone identifies its collection.
    pub fn id_suffix(&self) -> &'static str {
        match self {
            TrainingKind::QuestionSql => "-sql",
            TrainingKind::Ddl => "-ddl",
            TrainingKind::Documentation => "-doc",
        }
    }

    pub fn from_record_id(id: &str) -> Option<TrainingKind> {
        TrainingKind::ALL
            .iter()
            .copied()
            .find(|kind| id.ends_with(kind.id_suffix()))
    }

    /// Short label used in training responses.
    pub fn label(&self) -> &'static str {
        match self {
            TrainingKind::QuestionSql => "question_sql",
            TrainingKind::Ddl => "ddl",
            TrainingKind::Documentation => "documentation",
        }
    }
}

impl fmt::Display for TrainingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A stored training record.
///
/// For `QuestionSql`, `content` is the SQL and `question` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: String,
    pub kind: TrainingKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// A record about to be stored; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainingRecord {
    pub kind: TrainingKind,
    pub content: String,
    pub question: Option<String>,
}

impl NewTrainingRecord {
    pub fn ddl(ddl: impl Into<String>) -> Self {
        Self {
            kind: TrainingKind::Ddl,
            content: ddl.into(),
            question: None,
        }
    }

    pub fn documentation(doc: impl Into<String>) -> Self {
        Self {
            kind: TrainingKind::Documentation,
            content: doc.into(),
            question: None,
        }
    }

    pub fn question_sql(question: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            kind: TrainingKind::QuestionSql,
            content: sql.into(),
            question: Some(question.into()),
        }
    }

    /// Text that gets embedded: the question for pairs, the content otherwise.
    pub fn embedding_text(&self) -> &str {
        match (&self.kind, &self.question) {
            (TrainingKind::QuestionSql, Some(q)) => q,
            _ => &self.content,
        }
    }

    pub fn into_record(self, id: String) -> TrainingRecord {
        TrainingRecord {
            id,
            kind: self.kind,
            content: self.content,
            question: self.question,
        }
    }
}

/// A batch training request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingRequest {
    #[serde(default)]
    pub ddl: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub question: Option<Vec<String>>,
    #[serde(default)]
    pub sql: Option<Vec<String>>,
}

impl TrainingRequest {
    /// Validate the whole request and expand it into records, in write order
    /// (DDL, documentation, then pairs).
    ///
    /// Nothing is written if this fails.
    pub fn into_records(self) -> Result<Vec<NewTrainingRecord>> {
        let pairs = match (self.question, self.sql) {
            (None, None) => Vec::new(),
            (Some(questions), Some(sqls)) => {
                if questions.len() != sqls.len() {
                    return Err(Text2SqlError::Input(format!(
                        "question and sql lists must have the same length (got {} and {})",
                        questions.len(),
                        sqls.len()
                    )));
                }
                questions.into_iter().zip(sqls).collect()
            }
            (Some(questions), None) => {
                return Err(Text2SqlError::Input(format!(
                    "question and sql lists must have the same length (got {} and 0)",
                    questions.len()
                )))
            }
            (None, Some(sqls)) => {
                return Err(Text2SqlError::Input(format!(
                    "question and sql lists must have the same length (got 0 and {})",
                    sqls.len()
                )))
            }
        };

        let mut records = Vec::new();
        if let Some(ddl) = self.ddl.filter(|d| !d.trim().is_empty()) {
            records.push(NewTrainingRecord::ddl(ddl));
        }
        if let Some(doc) = self.documentation.filter(|d| !d.trim().is_empty()) {
            records.push(NewTrainingRecord::documentation(doc));
        }
        for (question, sql) in pairs {
            if question.trim().is_empty() || sql.trim().is_empty() {
                return Err(Text2SqlError::Input(
                    "question/sql pairs must not contain empty entries".to_string(),
                ));
            }
            records.push(NewTrainingRecord::question_sql(question, sql));
        }

        if records.is_empty() {
            return Err(Text2SqlError::Input(
                "Provide ddl, documentation, or question/sql pairs".to_string(),
            ));
        }
        Ok(records)
    }
}

/// Outcome of one stored record in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingItemResult {
    #[serde(rename = "type")]
    pub kind: TrainingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<usize>,
    /// Id of the stored record.
    #[serde(rename = "result")]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_record_id() {
        assert_eq!(
            TrainingKind::from_record_id("5f0c-sql"),
            Some(TrainingKind::QuestionSql)
        );
        assert_eq!(
            TrainingKind::from_record_id("5f0c-doc"),
            Some(TrainingKind::Documentation)
        );
        assert_eq!(TrainingKind::from_record_id("5f0c"), None);
    }

    #[test]
    fn test_mismatched_pairs_are_rejected() {
        let req = TrainingRequest {
            question: Some(vec!["a?".into(), "b?".into()]),
            sql: Some(vec!["SELECT 1".into()]),
            ..Default::default()
        };
        assert!(matches!(req.into_records(), Err(Text2SqlError::Input(_))));
    }

    #[test]
    fn test_missing_sql_side_is_a_mismatch() {
        let req = TrainingRequest {
            ddl: Some("CREATE TABLE t (id UInt32)".into()),
            question: Some(vec!["a?".into()]),
            ..Default::default()
        };
        assert!(req.into_records().is_err());
    }

    #[test]
    fn test_empty_request_is_rejected() {
        assert!(TrainingRequest::default().into_records().is_err());
    }

    #[test]
    fn test_records_in_write_order() {
        let req = TrainingRequest {
            ddl: Some("CREATE TABLE t (id UInt32)".into()),
            documentation: Some("t holds things".into()),
            question: Some(vec!["how many?".into()]),
            sql: Some(vec!["SELECT count() FROM t".into()]),
        };
        let kinds: Vec<_> = req.into_records().unwrap().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TrainingKind::Ddl,
                TrainingKind::Documentation,
                TrainingKind::QuestionSql
            ]
        );
    }

    #[test]
    fn test_pair_embeds_question() {
        let rec = NewTrainingRecord::question_sql("total sales?", "SELECT sum(x) FROM t");
        assert_eq!(rec.embedding_text(), "total sales?");
    }
}
