use crate::schema::TableSchema;
use crate::statement::{Parsed, Plan, StatementKind};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kvrelay_core::{
    BoundStatement, Clock, ClusterConfig, Consistency, DriverError, DriverResult,
    PreparedStatement, ResultSet, Row, Session, StorageDriver, SystemClock, TlsMaterial, Value,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One statement execution as seen by the cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub kind: StatementKind,
    pub consistency: Option<Consistency>,
    pub params: Vec<Value>,
    pub succeeded: bool,
}

#[derive(Debug, Clone)]
struct StoredRow {
    key: Vec<Value>,
    value: Value,
    written_at: i64,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredRow {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }

    fn column(&self, index: usize) -> Value {
        self.key.get(index).unwrap_or(&self.value).clone()
    }
}

struct Table {
    schema: TableSchema,
    rows: Vec<StoredRow>,
}

#[derive(Default)]
struct Faults {
    unreachable: bool,
    rejected_levels: HashSet<Consistency>,
    unavailable_levels: HashSet<Consistency>,
    failing_writes: usize,
    failing_keys: Vec<Value>,
    failing_prepares: Vec<String>,
    latency: Duration,
}

struct Shared {
    tables: RwLock<HashMap<String, Table>>,
    plans: RwLock<HashMap<u64, Plan>>,
    faults: Mutex<Faults>,
    executions: Mutex<Vec<ExecutionRecord>>,
    clock: Arc<dyn Clock>,
    next_statement_id: AtomicU64,
    open_sessions: AtomicUsize,
    connect_attempts: AtomicUsize,
}

/// An in-process cluster implementing [`StorageDriver`]
///
/// Clones share the same tables and fault settings.
#[derive(Clone)]
pub struct MemoryCluster {
    shared: Arc<Shared>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// A cluster that measures TTLs against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(HashMap::new()),
                plans: RwLock::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                executions: Mutex::new(Vec::new()),
                clock,
                next_statement_id: AtomicU64::new(1),
                open_sessions: AtomicUsize::new(0),
                connect_attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, schema: TableSchema) {
        tracing::debug!("Creating table {}", schema.name);
        self.shared.tables.write().insert(
            schema.name.clone(),
            Table {
                schema,
                rows: Vec::new(),
            },
        );
    }

    /// Make the cluster reachable or not. Open sessions fail while unreachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.faults.lock().unreachable = !reachable;
    }

    /// Refuse `level` when it is set on a statement.
    pub fn reject_consistency(&self, level: Consistency) {
        self.shared.faults.lock().rejected_levels.insert(level);
    }

    /// Accept `level` but fail executions at it as unavailable.
    pub fn fail_consistency(&self, level: Consistency) {
        self.shared.faults.lock().unavailable_levels.insert(level);
    }

    /// Fail the next `count` writes with a timeout.
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.faults.lock().failing_writes = count;
    }

    /// Fail every write whose first key column equals `key`.
    pub fn fail_writes_for(&self, key: impl Into<Value>) {
        self.shared.faults.lock().failing_keys.push(key.into());
    }

    /// Fail preparing any statement containing `fragment`.
    pub fn fail_prepare_matching(&self, fragment: &str) {
        self.shared
            .faults
            .lock()
            .failing_prepares
            .push(fragment.to_string());
    }

    /// Delay every execution by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.shared.faults.lock().latency = latency;
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        *self.shared.faults.lock() = Faults::default();
    }

    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.shared.executions.lock().clone()
    }

    pub fn clear_executions(&self) {
        self.shared.executions.lock().clear();
    }

    /// Rows of `table` that have not expired.
    pub fn row_count(&self, table: &str) -> usize {
        let now = self.shared.clock.now();
        self.shared
            .tables
            .read()
            .get(table)
            .map_or(0, |t| t.rows.iter().filter(|r| r.is_live(now)).count())
    }
}

impl StorageDriver for MemoryCluster {
    fn connect(
        &self,
        cluster: &ClusterConfig,
        _tls: Option<&TlsMaterial>,
        _timeout: Duration,
    ) -> DriverResult<Box<dyn Session>> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if cluster.hosts.is_empty() || self.shared.faults.lock().unreachable {
            return Err(DriverError::NoHostsAvailable(cluster.hosts.join(", ")));
        }
        self.shared.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemorySession {
    shared: Arc<Shared>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemorySession {
    fn check_reachable(&self) -> DriverResult<()> {
        if self.shared.faults.lock().unreachable {
            return Err(DriverError::NoHostsAvailable("cluster unreachable".into()));
        }
        Ok(())
    }

    fn plan_of(&self, statement: &BoundStatement) -> DriverResult<Plan> {
        self.shared
            .plans
            .read()
            .get(&statement.prepared().id())
            .cloned()
            .ok_or_else(|| DriverError::Invalid("statement was not prepared here".into()))
    }

    fn insert(&self, plan: &Plan, params: Vec<Value>) -> DriverResult<ResultSet> {
        let arity = plan.prefix_len;
        let (ttl, written_at) = match (&params[arity + 1], &params[arity + 2]) {
            (Value::Int(ttl), Value::BigInt(ts)) if *ttl >= 0 => (*ttl, *ts),
            _ => return Err(DriverError::Invalid("TTL must be a non-negative int".into())),
        };

        {
            let mut faults = self.shared.faults.lock();
            if faults.failing_writes > 0 {
                faults.failing_writes -= 1;
                return Err(DriverError::Timeout(Duration::ZERO));
            }
            if faults.failing_keys.iter().any(|k| Some(k) == params.first()) {
                return Err(DriverError::Server("write rejected".into()));
            }
        }

        let now = self.shared.clock.now();
        let row = StoredRow {
            key: params[..arity].to_vec(),
            value: params[arity].clone(),
            written_at,
            expires_at: (ttl > 0).then(|| now + ChronoDuration::seconds(i64::from(ttl))),
        };

        let mut tables = self.shared.tables.write();
        let table = tables
            .get_mut(&plan.table)
            .ok_or_else(|| DriverError::Invalid(format!("table {} dropped", plan.table)))?;
        match table.rows.iter_mut().find(|r| r.key == row.key) {
            // Last write wins; an older timestamp is ignored
            Some(existing) if existing.written_at > row.written_at && existing.is_live(now) => {}
            Some(existing) => *existing = row,
            None => table.rows.push(row),
        }
        Ok(ResultSet::empty())
    }

    fn select(&self, plan: &Plan, params: Vec<Value>) -> DriverResult<ResultSet> {
        let now = self.shared.clock.now();
        let tables = self.shared.tables.read();
        let table = tables
            .get(&plan.table)
            .ok_or_else(|| DriverError::Invalid(format!("table {} dropped", plan.table)))?;
        let rows = table
            .rows
            .iter()
            .filter(|r| r.is_live(now) && r.key[..plan.prefix_len] == params[..])
            .map(|r| Row::new(plan.projection.iter().map(|&i| Some(r.column(i))).collect()))
            .collect();
        Ok(ResultSet::new(rows))
    }
}

impl Session for MemorySession {
    fn prepare(&self, query: &str, _timeout: Duration) -> DriverResult<PreparedStatement> {
        self.check_reachable()?;
        if self
            .shared
            .faults
            .lock()
            .failing_prepares
            .iter()
            .any(|f| query.contains(f.as_str()))
        {
            return Err(DriverError::Server(format!("unable to prepare: {}", query)));
        }

        let parsed = Parsed::parse(query)?;
        let plan = {
            let tables = self.shared.tables.read();
            let table = tables.get(parsed.table()).ok_or_else(|| {
                DriverError::Invalid(format!("unconfigured table {}", parsed.table()))
            })?;
            parsed.plan(&table.schema)?
        };

        let id = self.shared.next_statement_id.fetch_add(1, Ordering::Relaxed);
        let prepared = PreparedStatement::new(
            id,
            query,
            plan.param_types.clone(),
            plan.column_types.clone(),
        );
        self.shared.plans.write().insert(id, plan);
        Ok(prepared)
    }

    fn set_consistency(
        &self,
        statement: &mut BoundStatement,
        level: Consistency,
    ) -> DriverResult<()> {
        if self.shared.faults.lock().rejected_levels.contains(&level) {
            return Err(DriverError::Invalid(format!("consistency {} rejected", level)));
        }
        let plan = self.plan_of(statement)?;
        match plan.kind {
            StatementKind::Select if level == Consistency::Any => {
                return Err(DriverError::Invalid("ANY is not supported for reads".into()))
            }
            StatementKind::Insert if level.is_serial() => {
                return Err(DriverError::Invalid(format!(
                    "{} is only valid for conditional updates",
                    level
                )))
            }
            _ => {}
        }
        statement.set_consistency_level(level);
        Ok(())
    }

    fn execute(&self, statement: &BoundStatement, timeout: Duration) -> DriverResult<ResultSet> {
        let latency = self.shared.faults.lock().latency;
        if latency > timeout {
            std::thread::sleep(timeout);
            return Err(DriverError::Timeout(timeout));
        }
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let plan = self.plan_of(statement)?;
        let params = statement
            .params()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.clone()
                    .ok_or_else(|| DriverError::Invalid(format!("parameter {} is unbound", i)))
            })
            .collect::<DriverResult<Vec<_>>>()?;

        let result = self.check_reachable().and_then(|()| {
            if let Some(level) = statement.consistency() {
                if self.shared.faults.lock().unavailable_levels.contains(&level) {
                    return Err(DriverError::Unavailable {
                        consistency: level,
                        required: 2,
                        alive: 1,
                    });
                }
            }
            match plan.kind {
                StatementKind::Insert => self.insert(&plan, params.clone()),
                StatementKind::Select => self.select(&plan, params.clone()),
            }
        });

        self.shared.executions.lock().push(ExecutionRecord {
            kind: plan.kind,
            consistency: statement.consistency(),
            params,
            succeeded: result.is_ok(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvrelay_core::{ManualClock, ValueType};

    const INSERT: &str =
        "INSERT INTO t (k, v) VALUES (?, ?) USING TTL ? AND TIMESTAMP ?";
    const SELECT: &str = "SELECT v FROM t WHERE k=?";

    fn cluster(clock: Arc<ManualClock>) -> MemoryCluster {
        let cluster = MemoryCluster::with_clock(clock);
        cluster.create_table(TableSchema::new(
            "t",
            vec![("k", ValueType::BigInt)],
            ("v", ValueType::Text),
        ));
        cluster
    }

    fn connect(cluster: &MemoryCluster) -> Box<dyn Session> {
        cluster
            .connect(&ClusterConfig::default(), None, Duration::from_secs(1))
            .unwrap()
    }

    fn write(
        session: &dyn Session,
        key: i64,
        value: &str,
        ttl: i32,
        ts: i64,
    ) -> DriverResult<ResultSet> {
        let prepared = session.prepare(INSERT, Duration::from_secs(1)).unwrap();
        write_prepared(session, &prepared, key, value, ttl, ts)
    }

    fn write_prepared(
        session: &dyn Session,
        prepared: &PreparedStatement,
        key: i64,
        value: &str,
        ttl: i32,
        ts: i64,
    ) -> DriverResult<ResultSet> {
        let mut stmt = prepared.bind();
        session.bind(&mut stmt, 0, Value::BigInt(key)).unwrap();
        session.bind(&mut stmt, 1, Value::Text(value.into())).unwrap();
        session.bind(&mut stmt, 2, Value::Int(ttl)).unwrap();
        session.bind(&mut stmt, 3, Value::BigInt(ts)).unwrap();
        session.set_consistency(&mut stmt, Consistency::One).unwrap();
        session.execute(&stmt, Duration::from_secs(1))
    }

    fn read(session: &dyn Session, key: i64) -> Vec<Row> {
        let prepared = session.prepare(SELECT, Duration::from_secs(1)).unwrap();
        let mut stmt = prepared.bind();
        session.bind(&mut stmt, 0, Value::BigInt(key)).unwrap();
        session.execute(&stmt, Duration::from_secs(1)).unwrap().into_rows()
    }

    #[test]
    fn test_ttl_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cluster = cluster(Arc::clone(&clock));
        let session = connect(&cluster);

        write(session.as_ref(), 1, "a", 60, 1).unwrap();
        write(session.as_ref(), 2, "b", 0, 1).unwrap();
        assert_eq!(read(session.as_ref(), 1).len(), 1);

        clock.advance_secs(60);
        assert!(read(session.as_ref(), 1).is_empty());
        assert_eq!(read(session.as_ref(), 2).len(), 1);
        assert_eq!(cluster.row_count("t"), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let clock = Arc::new(ManualClock::default());
        let cluster = cluster(clock);
        let session = connect(&cluster);

        write(session.as_ref(), 1, "new", 0, 200).unwrap();
        write(session.as_ref(), 1, "old", 0, 100).unwrap();
        let rows = read(session.as_ref(), 1);
        assert_eq!(
            rows[0].extract(0, ValueType::Text).unwrap(),
            Value::Text("new".into())
        );
    }

    #[test]
    fn test_sessions_are_counted() {
        let cluster = cluster(Arc::new(ManualClock::default()));
        let session = connect(&cluster);
        assert_eq!(cluster.open_sessions(), 1);
        drop(session);
        assert_eq!(cluster.open_sessions(), 0);

        cluster.set_reachable(false);
        assert!(cluster
            .connect(&ClusterConfig::default(), None, Duration::from_secs(1))
            .is_err());
        assert_eq!(cluster.connect_attempts(), 2);
    }

    #[test]
    fn test_fault_injection() {
        let cluster = cluster(Arc::new(ManualClock::default()));
        let session = connect(&cluster);

        cluster.fail_next_writes(1);
        assert!(matches!(
            write(session.as_ref(), 1, "a", 0, 1),
            Err(DriverError::Timeout(_))
        ));
        assert!(write(session.as_ref(), 1, "a", 0, 1).is_ok());

        cluster.fail_writes_for(7i64);
        assert!(write(session.as_ref(), 7, "a", 0, 1).is_err());

        let prepared = session.prepare(INSERT, Duration::from_secs(1)).unwrap();
        cluster.set_reachable(false);
        assert!(matches!(
            write_prepared(session.as_ref(), &prepared, 2, "a", 0, 1),
            Err(DriverError::NoHostsAvailable(_))
        ));
        cluster.clear_faults();
        assert!(write(session.as_ref(), 2, "a", 0, 1).is_ok());

        let log = cluster.executions();
        assert_eq!(log.len(), 5);
        assert_eq!(log.iter().filter(|e| e.succeeded).count(), 2);
        assert_eq!(log[0].consistency, Some(Consistency::One));
    }

    #[test]
    fn test_consistency_rules() {
        let cluster = cluster(Arc::new(ManualClock::default()));
        let session = connect(&cluster);

        let select = session.prepare(SELECT, Duration::from_secs(1)).unwrap();
        let mut stmt = select.bind();
        assert!(session.set_consistency(&mut stmt, Consistency::Any).is_err());
        assert!(session.set_consistency(&mut stmt, Consistency::LocalOne).is_ok());

        let insert = session.prepare(INSERT, Duration::from_secs(1)).unwrap();
        let mut stmt = insert.bind();
        assert!(session.set_consistency(&mut stmt, Consistency::Serial).is_err());
        assert!(session.set_consistency(&mut stmt, Consistency::Any).is_ok());

        cluster.reject_consistency(Consistency::Quorum);
        assert!(session.set_consistency(&mut stmt, Consistency::Quorum).is_err());
    }

    #[test]
    fn test_prepare_checks_schema() {
        let cluster = cluster(Arc::new(ManualClock::default()));
        let session = connect(&cluster);
        assert!(session
            .prepare("SELECT v FROM missing WHERE k=?", Duration::from_secs(1))
            .is_err());

        cluster.fail_prepare_matching("SELECT");
        assert!(session.prepare(SELECT, Duration::from_secs(1)).is_err());
        assert!(session.prepare(INSERT, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_latency_beyond_timeout() {
        let cluster = cluster(Arc::new(ManualClock::default()));
        let session = connect(&cluster);
        let prepared = session.prepare(SELECT, Duration::from_secs(1)).unwrap();
        let mut stmt = prepared.bind();
        session.bind(&mut stmt, 0, Value::BigInt(1)).unwrap();

        cluster.set_latency(Duration::from_millis(50));
        assert!(matches!(
            session.execute(&stmt, Duration::from_millis(5)),
            Err(DriverError::Timeout(_))
        ));
        assert!(session.execute(&stmt, Duration::from_secs(1)).is_ok());
    }
}
