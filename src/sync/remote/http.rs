//! PostgREST-style HTTP remote.
//!
//! Upserts POST to `{base}/events?on_conflict=event_id` with
//! `Prefer: resolution=merge-duplicates`.
//!
//! The change feed lists the whole table every `poll_interval` and diffs it
//! against the previous listing: new keys become `INSERT`, changed rows
//! `UPDATE`, vanished keys `DELETE`. Nothing depends on client-stamped
//! timestamps, so back-dated rows from devices that were offline and in-place
//! edits are both seen. The last listing delivered per table outlives a
//! subscription, so deletes made while disconnected are reported on the next
//! subscribe.
//!
//! Listings page with a keyset on the primary key and stop only on an empty
//! page, so a server-side `max-rows` cap cannot truncate them.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{ChangeFeed, RemoteEventRecord, RemoteStore};
use crate::config::SyncConfig;
use crate::sync::{ChangeMessage, ChangeType, RemoteTable, Result, SyncError};

/// Longest response body excerpt kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Rows requested per listing page.
const PAGE_SIZE: usize = 500;

/// Rows of one table by primary key.
type RowSet = BTreeMap<String, Value>;

/// HTTP remote store and polling change feed.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    /// Rows delivered to subscribers so far, per table.
    delivered: Arc<Mutex<HashMap<RemoteTable, RowSet>>>,
}

impl HttpRemote {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SyncError::Transport("remote URL not configured".to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            poll_interval,
            delivered: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Build from the `sync` configuration section.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let url = config
            .remote_url
            .clone()
            .ok_or_else(|| SyncError::Transport("remote URL not configured".to_string()))?;
        Self::new(
            url,
            config.api_key.clone(),
            config.push_timeout(),
            config.poll_interval(),
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    /// Every row of `table`, in key order.
    async fn fetch_all(&self, table: RemoteTable) -> Result<Vec<Value>> {
        let key = table.key_field();
        let mut rows = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut params = vec![
                ("select", "*".to_string()),
                ("order", format!("{}.asc", key)),
                ("limit", PAGE_SIZE.to_string()),
            ];
            if let Some(last) = &after {
                params.push((key, format!("gt.{}", last)));
            }

            let request = self.client.get(self.table_url(table.as_str())).query(&params);
            let response = self.authorize(request).send().await?;
            let page: Vec<Value> = check_status(response).await?.json().await?;

            let Some(last_row) = page.last() else {
                break;
            };
            let last = row_key(table, last_row).ok_or_else(|| {
                SyncError::Malformed(format!("{} row without '{}'", table, key))
            })?;
            if after.as_deref() == Some(last.as_str()) {
                return Err(SyncError::Malformed(format!(
                    "{} listing did not advance past '{}'",
                    table, last
                )));
            }

            after = Some(last);
            rows.extend(page);
        }

        debug!(table = %table, rows = rows.len(), "Remote table listed");
        Ok(rows)
    }

    async fn fetch_rows(&self, table: RemoteTable) -> Result<RowSet> {
        Ok(index_rows(table, self.fetch_all(table).await?))
    }

    async fn remember(&self, table: RemoteTable, change: &ChangeMessage) {
        let mut delivered = self.delivered.lock().await;
        let rows = delivered.entry(table).or_default();
        match change.change_type {
            ChangeType::Delete => {
                if let Some(key) = change.old.as_ref().and_then(|old| row_key(table, old)) {
                    rows.remove(&key);
                }
            }
            ChangeType::Insert | ChangeType::Update => {
                if let Some(row) = &change.new {
                    if let Some(key) = row_key(table, row) {
                        rows.insert(key, row.clone());
                    }
                }
            }
        }
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Remote {
        status: status.as_u16(),
        message: body.chars().take(ERROR_BODY_LIMIT).collect(),
    })
}

fn row_key(table: RemoteTable, row: &Value) -> Option<String> {
    row.get(table.key_field())
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn index_rows(table: RemoteTable, rows: Vec<Value>) -> RowSet {
    let mut indexed = RowSet::new();
    for row in rows {
        match row_key(table, &row) {
            Some(key) => {
                indexed.insert(key, row);
            }
            None => warn!(table = %table, "Remote row without primary key ignored"),
        }
    }
    indexed
}

/// Changes that turn `previous` into `current`.
fn diff_rows(table: RemoteTable, previous: &RowSet, current: &RowSet) -> Vec<ChangeMessage> {
    let mut changes = Vec::new();

    for (key, row) in current {
        match previous.get(key) {
            None => changes.push(ChangeMessage::upsert(ChangeType::Insert, row.clone())),
            Some(old) if old != row => {
                changes.push(ChangeMessage::upsert(ChangeType::Update, row.clone()))
            }
            Some(_) => {}
        }
    }

    for key in previous.keys().filter(|key| !current.contains_key(*key)) {
        let mut old = serde_json::Map::new();
        old.insert(table.key_field().to_string(), Value::String(key.clone()));
        changes.push(ChangeMessage::delete(Value::Object(old)));
    }

    changes
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn upsert_events(&self, records: &[RemoteEventRecord]) -> Result<()> {
        let request = self
            .client
            .post(self.table_url("events"))
            .query(&[("on_conflict", "event_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(records);

        let response = self.authorize(request).send().await?;
        check_status(response).await?;

        debug!(count = records.len(), "Events upserted to remote");
        Ok(())
    }
}

struct PollState {
    remote: HttpRemote,
    table: RemoteTable,
    /// Latest listing, the base of the next diff.
    listed: RowSet,
    buffered: VecDeque<ChangeMessage>,
    failed: bool,
}

#[async_trait]
impl ChangeFeed for HttpRemote {
    async fn subscribe(
        &self,
        table: RemoteTable,
    ) -> Result<BoxStream<'static, Result<ChangeMessage>>> {
        // Listing up front also makes an unreachable remote fail the subscribe.
        let listed = self.fetch_rows(table).await?;

        let buffered = {
            let mut delivered = self.delivered.lock().await;
            match delivered.get(&table) {
                Some(previous) => diff_rows(table, previous, &listed).into(),
                None => {
                    delivered.insert(table, listed.clone());
                    VecDeque::new()
                }
            }
        };

        let state = PollState {
            remote: self.clone(),
            table,
            listed,
            buffered,
            failed: false,
        };

        let stream = stream::unfold(state, |mut state| async move {
            if state.failed {
                return None;
            }
            loop {
                if let Some(change) = state.buffered.pop_front() {
                    state.remote.remember(state.table, &change).await;
                    return Some((Ok(change), state));
                }

                tokio::time::sleep(state.remote.poll_interval).await;

                match state.remote.fetch_rows(state.table).await {
                    Ok(current) => {
                        state.buffered.extend(diff_rows(state.table, &state.listed, &current));
                        state.listed = current;
                    }
                    Err(e) => {
                        warn!(table = %state.table, error = %e, "Change feed poll failed");
                        state.failed = true;
                        return Some((Err(e), state));
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn snapshot(&self, table: RemoteTable) -> Result<Vec<Value>> {
        self.fetch_all(table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventKind, InputMethod, LedgerEvent, Quantity, Silo};
    use crate::storage::MemoryLedgerBackend;
    use crate::store::LedgerStore;
    use crate::sync::{InboundSyncListener, ListenerState};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::watch;
    use tokio::time::{timeout, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    /// A request as the stub saw it.
    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        query: HashMap<String, String>,
        headers: HashMap<String, String>,
        body: String,
    }

    #[derive(Default)]
    struct StubState {
        tables: HashMap<String, RowSet>,
        requests: Vec<Recorded>,
        max_rows: Option<usize>,
        reject: Option<(u16, String)>,
    }

    /// Minimal PostgREST stand-in: keyset listing, `max-rows` cap, merge upserts.
    struct Stub {
        url: String,
        state: Arc<StdMutex<StubState>>,
    }

    impl Stub {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let state = Arc::new(StdMutex::new(StubState::default()));

            let shared = state.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(serve(socket, shared.clone()));
                }
            });

            Self { url, state }
        }

        fn remote(&self) -> HttpRemote {
            HttpRemote::new(
                self.url.clone(),
                Some("test-key".to_string()),
                Duration::from_secs(2),
                Duration::from_millis(20),
            )
            .unwrap()
        }

        fn put(&self, table: RemoteTable, row: Value) {
            let key = row_key(table, &row).unwrap();
            let mut state = self.state.lock().unwrap();
            state.tables.entry(table.as_str().to_string()).or_default().insert(key, row);
        }

        fn remove(&self, table: RemoteTable, key: &str) {
            let mut state = self.state.lock().unwrap();
            if let Some(rows) = state.tables.get_mut(table.as_str()) {
                rows.remove(key);
            }
        }

        fn rows(&self, table: RemoteTable) -> usize {
            let state = self.state.lock().unwrap();
            state.tables.get(table.as_str()).map_or(0, |rows| rows.len())
        }

        fn requests(&self) -> Vec<Recorded> {
            self.state.lock().unwrap().requests.clone()
        }

        fn set_max_rows(&self, max_rows: usize) {
            self.state.lock().unwrap().max_rows = Some(max_rows);
        }

        fn set_reject(&self, status: u16, message: &str) {
            self.state.lock().unwrap().reject = Some((status, message.to_string()));
        }
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
    }

    async fn serve(mut socket: TcpStream, state: Arc<StdMutex<StubState>>) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = find_header_end(&buf) {
                break end;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap_or_default().split(' ');
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();

        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body_end = buf.len().min(header_end + length);
        let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

        let url = reqwest::Url::parse(&format!("http://stub{}", target)).unwrap();
        let recorded = Recorded {
            method,
            path: url.path().to_string(),
            query: url.query_pairs().into_owned().collect(),
            headers,
            body,
        };

        let (status, payload) = respond(&state, recorded);
        let response = format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }

    fn respond(state: &StdMutex<StubState>, request: Recorded) -> (u16, String) {
        let mut state = state.lock().unwrap();
        state.requests.push(request.clone());

        let table = request.path.trim_start_matches('/').to_string();
        let key_field = if table == "events" { "event_id" } else { "id" };

        match request.method.as_str() {
            "POST" => {
                if let Some((status, message)) = &state.reject {
                    return (*status, json!({ "message": message }).to_string());
                }
                let Ok(Value::Array(rows)) = serde_json::from_str::<Value>(&request.body) else {
                    return (400, json!({ "message": "expected array" }).to_string());
                };
                let stored = state.tables.entry(table).or_default();
                for row in rows {
                    if let Some(key) = row.get(key_field).and_then(Value::as_str) {
                        stored.insert(key.to_string(), row.clone());
                    }
                }
                (201, String::new())
            }
            "GET" => {
                let after = request
                    .query
                    .get(key_field)
                    .and_then(|v| v.strip_prefix("gt."))
                    .map(str::to_string);
                let requested = request
                    .query
                    .get("limit")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                let limit = requested.min(state.max_rows.unwrap_or(usize::MAX));

                let rows: Vec<Value> = state
                    .tables
                    .get(&table)
                    .map(|rows| {
                        rows.iter()
                            .filter(|(key, _)| after.as_ref().map_or(true, |a| key.as_str() > a.as_str()))
                            .take(limit)
                            .map(|(_, row)| row.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                (200, Value::Array(rows).to_string())
            }
            _ => (405, String::new()),
        }
    }

    fn silo_row(id: &str, name: &str) -> Value {
        json!({ "id": id, "name": name, "created_at": "2024-05-01T08:00:00Z" })
    }

    fn event_row(id: &str, kg: i64, stamped: &str) -> Value {
        json!({
            "event_id": id,
            "silo_id": "s1",
            "kind": if kg >= 0 { "LOADING" } else { "USAGE" },
            "quantity_delta": kg,
            "input_method": "MANUAL_KG",
            "created_at": stamped,
            "updated_at": stamped
        })
    }

    async fn next_change(feed: &mut BoxStream<'static, Result<ChangeMessage>>) -> ChangeMessage {
        timeout(WAIT, feed.next())
            .await
            .expect("feed should deliver a change")
            .expect("feed should stay open")
            .expect("poll should succeed")
    }

    #[test]
    fn test_new_requires_url() {
        assert!(HttpRemote::new("", None, Duration::from_secs(1), Duration::from_secs(1)).is_err());
        let remote = HttpRemote::new(
            "https://example.test/rest/v1/",
            None,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(remote.table_url("events"), "https://example.test/rest/v1/events");
    }

    #[test]
    fn test_from_config_without_url_fails() {
        assert!(HttpRemote::from_config(&SyncConfig::default()).is_err());
    }

    #[test]
    fn test_diff_rows() {
        let previous = index_rows(
            RemoteTable::Silos,
            vec![silo_row("a", "A"), silo_row("b", "B"), silo_row("c", "C")],
        );
        let current = index_rows(
            RemoteTable::Silos,
            vec![silo_row("a", "A"), silo_row("b", "B2"), silo_row("d", "D"), json!({ "name": "keyless" })],
        );

        let changes = diff_rows(RemoteTable::Silos, &previous, &current);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].change_type, ChangeType::Update);
        assert_eq!(changes[0].new.as_ref().unwrap()["name"], "B2");
        assert_eq!(changes[1].change_type, ChangeType::Insert);
        assert_eq!(changes[1].new.as_ref().unwrap()["id"], "d");
        assert_eq!(changes[2].change_type, ChangeType::Delete);
        assert_eq!(changes[2].old.as_ref().unwrap()["id"], "c");
    }

    #[tokio::test]
    async fn test_upsert_request_contract() {
        let stub = Stub::start().await;
        let remote = stub.remote();

        let event = LedgerEvent::new(
            "s1",
            EventKind::Loading,
            Quantity::from_whole_kg(1_000),
            InputMethod::ManualKg,
            None,
        );
        let records = vec![RemoteEventRecord::from_event(&event, None)];
        remote.upsert_events(&records).await.unwrap();
        remote.upsert_events(&records).await.unwrap();
        assert_eq!(stub.rows(RemoteTable::Events), 1);

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        let request = &requests[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/events");
        assert_eq!(request.query.get("on_conflict").map(String::as_str), Some("event_id"));
        assert!(request.headers["prefer"].contains("resolution=merge-duplicates"));
        assert_eq!(request.headers["apikey"], "test-key");
        assert_eq!(request.headers["authorization"], "Bearer test-key");

        let body: Value = serde_json::from_str(&request.body).unwrap();
        let row = &body.as_array().unwrap()[0];
        assert_eq!(row["event_id"], event.event_id.as_str());
        assert_eq!(row["quantity_delta"], 1_000);
        assert!(row.get("sync_state").is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejection_maps_to_remote_error() {
        let stub = Stub::start().await;
        stub.set_reject(409, "insert or update violates foreign key constraint");

        let event = LedgerEvent::new(
            "s1",
            EventKind::Usage,
            Quantity::from_whole_kg(-5),
            InputMethod::ManualKg,
            None,
        );
        let err = stub
            .remote()
            .upsert_events(&[RemoteEventRecord::from_event(&event, None)])
            .await
            .unwrap_err();
        match err {
            SyncError::Remote { status, message } => {
                assert_eq!(status, 409);
                assert!(message.contains("foreign key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_pages_past_row_cap() {
        let stub = Stub::start().await;
        stub.set_max_rows(2);
        for i in 0..5 {
            stub.put(RemoteTable::Silos, silo_row(&format!("s{i}"), "Silo"));
        }

        let rows = stub.remote().snapshot(RemoteTable::Silos).await.unwrap();
        assert_eq!(rows.len(), 5);

        let gets = stub.requests().into_iter().filter(|r| r.method == "GET").count();
        assert_eq!(gets, 4, "three capped pages and the empty one ending the listing");
    }

    #[tokio::test]
    async fn test_subscribe_fails_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let remote = HttpRemote::new(url, None, Duration::from_secs(1), Duration::from_millis(20))
            .unwrap();
        assert!(remote.subscribe(RemoteTable::Events).await.is_err());
    }

    #[tokio::test]
    async fn test_feed_reports_backdated_rows_edits_and_deletes() {
        let stub = Stub::start().await;
        stub.put(RemoteTable::Silos, silo_row("s1", "Old name"));
        let remote = stub.remote();
        let mut feed = remote.subscribe(RemoteTable::Silos).await.unwrap();

        // Created long ago on a device that was offline.
        stub.put(
            RemoteTable::Silos,
            json!({ "id": "s0", "name": "Back-dated", "created_at": "2020-01-01T00:00:00Z" }),
        );
        let change = next_change(&mut feed).await;
        assert_eq!(change.change_type, ChangeType::Insert);
        assert_eq!(change.new.unwrap()["id"], "s0");

        stub.put(RemoteTable::Silos, silo_row("s1", "New name"));
        let change = next_change(&mut feed).await;
        assert_eq!(change.change_type, ChangeType::Update);
        assert_eq!(change.new.unwrap()["name"], "New name");

        stub.remove(RemoteTable::Silos, "s1");
        let change = next_change(&mut feed).await;
        assert_eq!(change.change_type, ChangeType::Delete);
        assert_eq!(change.old.unwrap()["id"], "s1");
    }

    #[tokio::test]
    async fn test_resubscribe_reports_deletes_missed_while_disconnected() {
        let stub = Stub::start().await;
        stub.put(RemoteTable::Events, event_row("e1", 100, "2024-05-02T10:00:00Z"));
        stub.put(RemoteTable::Events, event_row("e2", 200, "2024-05-02T10:00:00Z"));
        let remote = stub.remote();

        drop(remote.subscribe(RemoteTable::Events).await.unwrap());
        stub.remove(RemoteTable::Events, "e1");

        let mut feed = remote.subscribe(RemoteTable::Events).await.unwrap();
        let change = next_change(&mut feed).await;
        assert_eq!(change.change_type, ChangeType::Delete);
        assert_eq!(change.old.unwrap()["event_id"], "e1");
    }

    #[tokio::test]
    async fn test_listener_applies_remote_changes_over_http() {
        let stub = Stub::start().await;
        stub.put(RemoteTable::Silos, silo_row("s1", "Old name"));
        stub.put(RemoteTable::Events, event_row("e1", 1_000, "2024-05-02T10:00:00Z"));

        let store = LedgerStore::with_backend(Arc::new(MemoryLedgerBackend::new()))
            .await
            .unwrap();
        let listener = Arc::new(InboundSyncListener::new(store.clone(), Arc::new(stub.remote())));
        let mut state = listener.watch_state();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = listener.clone().spawn(shutdown_rx);
        timeout(WAIT, state.wait_for(|s| *s == ListenerState::Subscribed))
            .await
            .unwrap()
            .unwrap();

        let one_hour_ago = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        stub.put(RemoteTable::Events, event_row("e2", -300, &one_hour_ago));
        stub.put(RemoteTable::Silos, silo_row("s1", "New name"));

        let deadline = Instant::now() + WAIT;
        loop {
            let offline: Option<LedgerEvent> = store.get("e2").await.unwrap();
            let silo: Option<Silo> = store.get("s1").await.unwrap();
            if offline.is_some() && silo.as_ref().map(|s| s.name.as_str()) == Some("New name") {
                break;
            }
            assert!(Instant::now() < deadline, "remote changes not applied");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        stub.remove(RemoteTable::Silos, "s1");
        stub.remove(RemoteTable::Events, "e1");
        let deadline = Instant::now() + WAIT;
        loop {
            let silo: Option<Silo> = store.get("s1").await.unwrap();
            let deleted: Option<LedgerEvent> = store.get("e1").await.unwrap();
            if silo.is_none() && deleted.is_none() {
                break;
            }
            assert!(Instant::now() < deadline, "remote deletes not applied");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.get::<LedgerEvent>("e2").await.unwrap().is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
