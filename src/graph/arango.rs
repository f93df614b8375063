/// ArangoDB graph store
///
/// Talks to ArangoDB over its HTTP API. Every operation is a single AQL query
/// posted to the cursor endpoint; multi-batch results are drained by
/// following the cursor id.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{GraphError, GraphStore};
use crate::config::GraphConfig;
use crate::model::{
    content_key, DocEdgeRecord, DocPhraseRecord, EdgeKind, EdgeRecord, FrequentKind, PhraseRecord, PhraseStatus,
    StatusFilter, WordRecord,
};

const CURSOR_BATCH_SIZE: u64 = 1000;

/// Cursor API response (first batch or follow-up).
#[derive(Deserialize)]
struct CursorResponse<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

/// Error body ArangoDB returns alongside non-2xx statuses.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorNum", default)]
    error_num: i64,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

fn api_error(code: u16, body: &str) -> GraphError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => GraphError::Query {
            code,
            num: parsed.error_num,
            message: parsed.error_message,
        },
        Err(_) => GraphError::Query {
            code,
            num: 0,
            message: body.to_string(),
        },
    }
}

fn connection_error(e: reqwest::Error) -> GraphError {
    GraphError::Connection(e.to_string())
}

/// FILTER clause and extra bind variable for a data-fetcher status filter.
fn status_filter_clause(filter: StatusFilter) -> (&'static str, Option<&'static str>) {
    match filter {
        StatusFilter::All => ("", None),
        StatusFilter::HasStatus => ("FILTER p.status != null", None),
        StatusFilter::NoStatus => ("FILTER p.status == null", None),
        StatusFilter::Is(status) => ("FILTER p.status == @status", Some(status.as_str())),
    }
}

pub struct ArangoGraphStore {
    client: reqwest::Client,
    /// http://host:port/_db/<database>
    db_url: String,
    username: String,
    password: String,
    collections: GraphConfig,
}

impl ArangoGraphStore {
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GraphError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ArangoGraphStore {
            client,
            db_url: format!("{}/_db/{}", config.base_url(), config.database),
            username: config.username.clone(),
            password: config.password.clone(),
            collections: config.clone(),
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<CursorResponse<T>, GraphError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        let body = response.text().await.map_err(connection_error)?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| GraphError::Decode(format!("Unexpected cursor response: {}", e)))
    }

    /// Run an AQL query and collect every result row.
    async fn query<T: DeserializeOwned>(&self, aql: &str, bind_vars: Value) -> Result<Vec<T>, GraphError> {
        let body = json!({
            "query": aql,
            "bindVars": bind_vars,
            "batchSize": CURSOR_BATCH_SIZE,
        });

        let first: CursorResponse<T> = self
            .send(self.client.post(format!("{}/_api/cursor", self.db_url)).json(&body))
            .await?;

        let mut rows = first.result;
        let mut has_more = first.has_more;
        let cursor_id = first.id;

        while has_more {
            let Some(id) = cursor_id.as_deref() else {
                return Err(GraphError::Decode("Cursor reports more results but has no id".to_string()));
            };
            let next: CursorResponse<T> = self
                .send(self.client.put(format!("{}/_api/cursor/{}", self.db_url, id)))
                .await?;
            rows.extend(next.result);
            has_more = next.has_more;
        }

        Ok(rows)
    }

    /// Run an AQL query for its side effects only.
    async fn execute(&self, aql: &str, bind_vars: Value) -> Result<(), GraphError> {
        self.query::<Value>(aql, bind_vars).await.map(|_| ())
    }

    fn edge_collections(&self, kind: EdgeKind) -> (&str, &str) {
        match kind {
            EdgeKind::Phrase => (&self.collections.phrase_collection, &self.collections.edge_collection),
            EdgeKind::Word => (&self.collections.word_collection, &self.collections.word_edge_collection),
        }
    }

    fn frequent_collection(&self, kind: FrequentKind) -> &str {
        match kind {
            FrequentKind::Stop => &self.collections.repeated_stops_collection,
            FrequentKind::NamedEntity => &self.collections.repeated_ne_collection,
        }
    }

    async fn truncate(&self, collection: &str) -> Result<(), GraphError> {
        let url = format!("{}/_api/collection/{}/truncate", self.db_url, collection);
        self.send::<Value>(self.client.put(url)).await.map(|_| ())
    }
}

#[async_trait]
impl GraphStore for ArangoGraphStore {
    async fn upsert_phrase(&self, phrase: &PhraseRecord) -> Result<(), GraphError> {
        self.execute(
            "UPSERT { _key: @key } \
             INSERT { _key: @key, bag: @bag, count: @count, status: @status, length: @length } \
             UPDATE { count: OLD.count + @count } \
             IN @@col",
            json!({
                "@col": self.collections.phrase_collection,
                "key": phrase.key,
                "bag": phrase.bag,
                "count": phrase.count,
                "status": phrase.status,
                "length": phrase.length,
            }),
        )
        .await
    }

    async fn upsert_word(&self, word: &WordRecord) -> Result<(), GraphError> {
        self.execute(
            "UPSERT { _key: @key } \
             INSERT { _key: @key, word: @word, count: @count, status: @status } \
             UPDATE { count: OLD.count + @count } \
             IN @@col",
            json!({
                "@col": self.collections.word_collection,
                "key": word.key,
                "word": word.word,
                "count": word.count,
                "status": word.status,
            }),
        )
        .await
    }

    async fn upsert_edge(&self, kind: EdgeKind, edge: &EdgeRecord) -> Result<(), GraphError> {
        let (vertices, edges) = self.edge_collections(kind);
        self.execute(
            "UPSERT { _key: @key } \
             INSERT { _key: @key, _from: @from, _to: @to, count: @count } \
             UPDATE { count: OLD.count + @count } \
             IN @@col",
            json!({
                "@col": edges,
                "key": edge.key,
                "from": format!("{}/{}", vertices, edge.from),
                "to": format!("{}/{}", vertices, edge.to),
                "count": edge.count,
            }),
        )
        .await
    }

    async fn stage_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), GraphError> {
        let doc = serde_json::to_value(record)
            .map_err(|e| GraphError::Internal(format!("Failed to encode staging record: {}", e)))?;
        self.execute(
            "INSERT @doc INTO @@col OPTIONS { overwriteMode: \"ignore\" }",
            json!({
                "@col": self.collections.doc_phrase_collection,
                "doc": doc,
            }),
        )
        .await
    }

    async fn doc_phrases(&self, sitename: &str, doc_id: &str) -> Result<Vec<DocPhraseRecord>, GraphError> {
        self.query(
            "FOR d IN @@col FILTER d.sitename == @sitename AND d.doc_id == @doc_id RETURN d",
            json!({
                "@col": self.collections.doc_phrase_collection,
                "sitename": sitename,
                "doc_id": doc_id,
            }),
        )
        .await
    }

    async fn aggregate_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), GraphError> {
        self.execute(
            "FOR d IN @@staging \
               FILTER d._key == @key AND d.agg_status != 1 \
               LIMIT 1 \
               UPSERT { _key: d.phrase_hash } \
               INSERT { _key: d.phrase_hash, bag: d.bag, count: d.count, status: d.status, length: d.length } \
               UPDATE { count: OLD.count + d.count } \
               IN @@agg \
               UPDATE d WITH { agg_status: 1 } IN @@staging",
            json!({
                "@staging": self.collections.doc_phrase_collection,
                "@agg": self.collections.phrase_collection,
                "key": record.key,
            }),
        )
        .await
    }

    async fn stage_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), GraphError> {
        let doc = serde_json::to_value(record)
            .map_err(|e| GraphError::Internal(format!("Failed to encode staged edge: {}", e)))?;
        self.execute(
            "INSERT @doc INTO @@col OPTIONS { overwriteMode: \"ignore\" }",
            json!({
                "@col": self.collections.doc_edge_collection,
                "doc": doc,
            }),
        )
        .await
    }

    async fn doc_edges(&self, sitename: &str, doc_id: &str) -> Result<Vec<DocEdgeRecord>, GraphError> {
        self.query(
            "FOR d IN @@col FILTER d.sitename == @sitename AND d.doc_id == @doc_id RETURN d",
            json!({
                "@col": self.collections.doc_edge_collection,
                "sitename": sitename,
                "doc_id": doc_id,
            }),
        )
        .await
    }

    async fn aggregate_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), GraphError> {
        let (vertices, edges) = self.edge_collections(EdgeKind::Phrase);
        self.execute(
            "FOR d IN @@staging \
               FILTER d._key == @key AND d.agg_status != 1 \
               LIMIT 1 \
               UPSERT { _key: d.edge_key } \
               INSERT { _key: d.edge_key, _from: CONCAT(@vertices, \"/\", d.from), \
                        _to: CONCAT(@vertices, \"/\", d.to), count: d.count } \
               UPDATE { count: OLD.count + d.count } \
               IN @@edges \
               UPDATE d WITH { agg_status: 1 } IN @@staging",
            json!({
                "@staging": self.collections.doc_edge_collection,
                "@edges": edges,
                "vertices": vertices,
                "key": record.key,
            }),
        )
        .await
    }

    async fn set_status(&self, key: &str, status: PhraseStatus) -> Result<bool, GraphError> {
        let updated: Vec<String> = self
            .query(
                "FOR p IN @@col FILTER p._key == @key \
                 UPDATE p WITH { status: @status } IN @@col \
                 RETURN NEW._key",
                json!({
                    "@col": self.collections.phrase_collection,
                    "key": key,
                    "status": status.as_str(),
                }),
            )
            .await?;
        Ok(!updated.is_empty())
    }

    async fn fetch_phrases(
        &self,
        filter: StatusFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PhraseRecord>, GraphError> {
        let (clause, status) = status_filter_clause(filter);
        let aql = format!(
            "FOR p IN @@col {} SORT p.count DESC LIMIT @offset, @limit RETURN p",
            clause
        );
        let mut bind_vars = json!({
            "@col": self.collections.phrase_collection,
            "offset": offset,
            "limit": limit,
        });
        if let Some(status) = status {
            bind_vars["status"] = json!(status);
        }
        self.query(&aql, bind_vars).await
    }

    async fn phrase_window(&self, offset: u64, limit: u64) -> Result<Vec<PhraseRecord>, GraphError> {
        self.query(
            "FOR p IN @@col SORT p._key LIMIT @offset, @limit RETURN p",
            json!({
                "@col": self.collections.phrase_collection,
                "offset": offset,
                "limit": limit,
            }),
        )
        .await
    }

    async fn suggest_highlight(&self, key: &str) -> Result<bool, GraphError> {
        let updated: Vec<String> = self
            .query(
                "FOR p IN @@col FILTER p._key == @key AND p.status == null \
                 UPDATE p WITH { status: @status } IN @@col \
                 RETURN NEW._key",
                json!({
                    "@col": self.collections.phrase_collection,
                    "key": key,
                    "status": PhraseStatus::SuggestedHighlight.as_str(),
                }),
            )
            .await?;
        Ok(!updated.is_empty())
    }

    async fn has_entity(&self, key: &str) -> Result<bool, GraphError> {
        let found: Vec<bool> = self
            .query(
                "FOR e IN @@col FILTER e._key == @key LIMIT 1 RETURN true",
                json!({
                    "@col": self.collections.ner_collection,
                    "key": key,
                }),
            )
            .await?;
        Ok(!found.is_empty())
    }

    async fn insert_entity(&self, word: &str) -> Result<bool, GraphError> {
        let inserted: Vec<bool> = self
            .query(
                "UPSERT { _key: @key } \
                 INSERT { _key: @key, word: @word } \
                 UPDATE {} \
                 IN @@col \
                 RETURN OLD == null",
                json!({
                    "@col": self.collections.ner_collection,
                    "key": content_key(word),
                    "word": word,
                }),
            )
            .await?;
        Ok(inserted.first().copied().unwrap_or(false))
    }

    async fn entities(&self) -> Result<Vec<String>, GraphError> {
        self.query(
            "FOR e IN @@col FILTER e.word != null RETURN e.word",
            json!({ "@col": self.collections.ner_collection }),
        )
        .await
    }

    async fn stop_words(&self) -> Result<Vec<String>, GraphError> {
        self.query(
            "FOR s IN @@col FILTER s.word != null RETURN s.word",
            json!({ "@col": self.collections.stop_collection }),
        )
        .await
    }

    async fn frequent_phrases(&self, kind: FrequentKind) -> Result<Vec<String>, GraphError> {
        self.query(
            "FOR p IN @@col FILTER p.phrase != null RETURN p.phrase",
            json!({ "@col": self.frequent_collection(kind) }),
        )
        .await
    }

    async fn truncate_all(&self) -> Result<(), GraphError> {
        let c = &self.collections;
        for collection in [
            &c.phrase_collection,
            &c.doc_phrase_collection,
            &c.doc_edge_collection,
            &c.edge_collection,
            &c.word_collection,
            &c.word_edge_collection,
            &c.ner_collection,
            &c.stop_collection,
            &c.repeated_stops_collection,
            &c.repeated_ne_collection,
        ] {
            self.truncate(collection).await?;
            tracing::debug!(collection = %collection, "Truncated collection");
        }
        Ok(())
    }
}
