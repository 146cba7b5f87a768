use crate::record::{EntityCode, Record, RecordId};
use serde::{Deserialize, Serialize};

/// Height and time window of an overlap query.
///
/// Unlike records, a window is not required to be well-ordered: an inverted
/// window is a legal query that simply matches less (often nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryWindow {
    pub min_height: i64,
    pub max_height: i64,
    pub start_time: i64,
    pub end_time: i64,
}

impl QueryWindow {
    pub fn new(min_height: i64, max_height: i64, start_time: i64, end_time: i64) -> Self {
        Self {
            min_height,
            max_height,
            start_time,
            end_time,
        }
    }

    /// Window covering every height and every instant.
    pub fn unbounded() -> Self {
        Self::new(i64::MIN, i64::MAX, i64::MIN, i64::MAX)
    }
}

/// Projection of the records matched by a query, as three parallel sequences.
///
/// Entry `i` of each sequence belongs to the same record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub urls: Vec<String>,
    pub entity_numbers: Vec<u8>,
    pub ids: Vec<RecordId>,
}

impl QueryResult {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            urls: Vec::with_capacity(capacity),
            entity_numbers: Vec::with_capacity(capacity),
            ids: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: &Record) {
        self.urls.push(record.url.clone());
        self.entity_numbers.push(record.entity.get());
        self.ids.push(record.id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate rows as `(url, entity, id)` triples.
    pub fn rows(&self) -> impl Iterator<Item = (&str, u8, RecordId)> {
        self.urls
            .iter()
            .zip(&self.entity_numbers)
            .zip(&self.ids)
            .map(|((url, entity), id)| (url.as_str(), *entity, *id))
    }

    /// Entity codes as typed values. Codes were validated on write.
    pub fn entities(&self) -> impl Iterator<Item = EntityCode> + '_ {
        self.entity_numbers
            .iter()
            .filter_map(|code| EntityCode::new(*code).ok())
    }
}

impl<'a> FromIterator<&'a Record> for QueryResult {
    fn from_iter<I: IntoIterator<Item = &'a Record>>(iter: I) -> Self {
        let mut result = QueryResult::default();
        for record in iter {
            result.push(record);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_rows_stay_parallel() {
        let records = [
            Record {
                id: 1,
                geohash: "g".into(),
                min_height: 0,
                max_height: 1,
                start_time: 0,
                end_time: 1,
                url: "a".into(),
                entity: EntityCode::new(1).unwrap(),
            },
            Record {
                id: 2,
                geohash: "g".into(),
                min_height: 0,
                max_height: 1,
                start_time: 0,
                end_time: 1,
                url: "b".into(),
                entity: EntityCode::new(3).unwrap(),
            },
        ];

        let result: QueryResult = records.iter().collect();
        let rows: Vec<_> = result.rows().collect();
        assert_eq!(rows, vec![("a", 1, 1), ("b", 3, 2)]);
        assert_eq!(result.entities().count(), 2);
    }

    #[test]
    fn test_empty_result_serializes_three_arrays() {
        let json = serde_json::to_string(&QueryResult::default()).unwrap();
        assert_eq!(json, r#"{"urls":[],"entityNumbers":[],"ids":[]}"#);
    }
}
