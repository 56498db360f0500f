#![allow(clippy::manual_async_fn)]

use std::sync::{Arc, Mutex, MutexGuard};

use asupersync::PanicPayload;
use asupersync::runtime::RuntimeBuilder;
use ormscope::prelude::*;
use ormscope::{PlaceholderStyle, TransactionOps};
use ormscope_core::count_placeholders;

// ============================================================================
// Recording connection
// ============================================================================

#[derive(Debug, Default)]
struct State {
    committed: Vec<(String, usize)>,
    queries: Vec<(String, Vec<Value>)>,
    began: usize,
    rolled_back: usize,
    fail_on: Option<String>,
    panic_on: Option<String>,
    fail_rollback: bool,
}

#[derive(Debug, Default, Clone)]
struct RecordingConnection {
    state: Arc<Mutex<State>>,
}

impl RecordingConnection {
    fn failing_on(marker: &str) -> Self {
        let conn = Self::default();
        conn.state().fail_on = Some(marker.to_string());
        conn
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

struct RecordingTx<'a> {
    conn: &'a RecordingConnection,
    staged: Mutex<Vec<(String, usize)>>,
}

/// Split a batch into statements, dropping the envelope's own BEGIN/COMMIT.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "BEGIN TRANSACTION" && *s != "COMMIT")
        .map(str::to_string)
        .collect()
}

impl TransactionOps for RecordingTx<'_> {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.conn.state().queries.push((sql.to_string(), params.to_vec()));
        async { Outcome::Ok(vec![]) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = Outcome<u64, Error>> + Send {
        let (fail, panic) = {
            let state = self.conn.state();
            let hit = |marker: &Option<String>| marker.as_deref().is_some_and(|m| sql.contains(m));
            (hit(&state.fail_on), hit(&state.panic_on))
        };
        let outcome = if panic {
            Outcome::Panicked(PanicPayload::new("backend driver panicked"))
        } else if fail {
            Outcome::Err(Error::execution("statement rejected by backend"))
        } else {
            let statements = split_statements(sql);
            let count = statements.len() as u64;
            let mut staged = self.staged.lock().unwrap();
            staged.extend(statements.into_iter().map(|s| (s, params.len())));
            Outcome::Ok(count)
        };
        async move { outcome }
    }

    fn commit(self, _cx: &Cx) -> impl std::future::Future<Output = Outcome<(), Error>> + Send {
        let staged = self.staged.into_inner().unwrap();
        self.conn.state().committed.extend(staged);
        async { Outcome::Ok(()) }
    }

    fn rollback(self, _cx: &Cx) -> impl std::future::Future<Output = Outcome<(), Error>> + Send {
        let mut state = self.conn.state();
        state.rolled_back += 1;
        let outcome = if state.fail_rollback {
            Outcome::Err(Error::execution("connection lost during rollback"))
        } else {
            Outcome::Ok(())
        };
        async move { outcome }
    }
}

impl Connection for RecordingConnection {
    type Tx<'conn>
        = RecordingTx<'conn>
    where
        Self: 'conn;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.state().queries.push((sql.to_string(), params.to_vec()));
        async { Outcome::Ok(vec![]) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = Outcome<u64, Error>> + Send {
        let statements = split_statements(sql);
        let count = statements.len() as u64;
        self.state()
            .committed
            .extend(statements.into_iter().map(|s| (s, params.len())));
        async move { Outcome::Ok(count) }
    }

    fn begin(
        &self,
        _cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.state().began += 1;
        async move {
            Outcome::Ok(RecordingTx {
                conn: self,
                staged: Mutex::new(Vec::new()),
            })
        }
    }
}

#[derive(Debug, Default)]
struct RecordingConnector {
    calls: Mutex<Vec<(String, String)>>,
}

impl Connector for RecordingConnector {
    type Connection = RecordingConnection;

    fn connect(&self, driver: &str, source: &str) -> ormscope::Result<RecordingConnection> {
        self.calls
            .lock()
            .unwrap()
            .push((driver.to_string(), source.to_string()));
        Ok(RecordingConnection::default())
    }
}

// ============================================================================
// Records
// ============================================================================

struct Hero {
    id: Option<i64>,
    name: String,
    age: i32,
}

impl Record for Hero {
    fn describe() -> ShapeDescriptor {
        ShapeDescriptor::new("Hero")
            .table("heroes")
            .field(FieldDescriptor::new("ID", DeclaredType::I64))
            .field(FieldDescriptor::new("Name", DeclaredType::String))
            .field(FieldDescriptor::new("Age", DeclaredType::I32))
            .field(FieldDescriptor::new(
                "CreatedAt",
                DeclaredType::optional(DeclaredType::Timestamp),
            ))
            .field(FieldDescriptor::new(
                "DeletedAt",
                DeclaredType::optional(DeclaredType::Timestamp),
            ))
    }

    fn values(&self) -> Vec<(String, Value)> {
        vec![
            ("ID".to_string(), Value::from(self.id)),
            ("Name".to_string(), Value::from(self.name.as_str())),
            ("Age".to_string(), Value::from(self.age)),
            ("CreatedAt".to_string(), Value::Null),
            ("DeletedAt".to_string(), Value::Null),
        ]
    }
}

struct Villain {
    id: Option<i64>,
    name: String,
}

impl Record for Villain {
    fn describe() -> ShapeDescriptor {
        ShapeDescriptor::new("Villain")
            .field(FieldDescriptor::new("ID", DeclaredType::I64))
            .field(FieldDescriptor::new("Name", DeclaredType::String))
    }

    fn values(&self) -> Vec<(String, Value)> {
        vec![
            ("ID".to_string(), Value::from(self.id)),
            ("Name".to_string(), Value::from(self.name.as_str())),
        ]
    }
}

fn hero(id: Option<i64>) -> Hero {
    Hero {
        id,
        name: "Deadpond".to_string(),
        age: 30,
    }
}

fn open(dialect: &str, conn: RecordingConnection) -> Db<RecordingConnection> {
    Db::open_with_connection(OpenConfig::new(dialect), conn).unwrap()
}

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn run<F: std::future::Future>(fut: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(fut)
}

// ============================================================================
// DDL
// ============================================================================

#[test]
fn ql_create_table_sql_uses_envelope() {
    let db = open("ql-mem", RecordingConnection::default());
    let expr = db.create_table_sql(&[RecordRef::of::<Villain>()]).unwrap();
    assert_eq!(
        expr.sql,
        "BEGIN TRANSACTION; \n\tCREATE TABLE IF NOT EXISTS villains (id int64 NOT NULL, name string NOT NULL);\nCOMMIT;"
    );
    assert!(expr.args.is_empty());
}

#[test]
fn multi_table_envelope_keeps_order() {
    let db = open("ql", RecordingConnection::default());
    let expr = db
        .create_table_sql(&[RecordRef::of::<Hero>(), RecordRef::of::<Villain>()])
        .unwrap();
    assert!(expr.sql.starts_with("BEGIN TRANSACTION; \n\tCREATE TABLE IF NOT EXISTS heroes ("));
    assert!(expr.sql.ends_with(";\nCOMMIT;"));
    assert_eq!(expr.sql.matches("\tCREATE TABLE IF NOT EXISTS").count(), 2);
    let heroes = expr.sql.find("heroes").unwrap();
    let villains = expr.sql.find("villains").unwrap();
    assert!(heroes < villains);
}

#[test]
fn multi_statement_dialect_skips_envelope() {
    let db = open("sqlite", RecordingConnection::default());
    let expr = db
        .create_table_sql(&[RecordRef::of::<Hero>(), RecordRef::of::<Villain>()])
        .unwrap();
    assert!(!expr.sql.contains("BEGIN TRANSACTION"));
    assert!(expr.sql.starts_with("CREATE TABLE IF NOT EXISTS \"heroes\""));
    assert!(expr.sql.contains(";\nCREATE TABLE IF NOT EXISTS \"villains\""));
    assert!(expr.sql.ends_with(';'));
}

#[test]
fn create_table_sql_without_records_is_rejected() {
    let db = open("ql", RecordingConnection::default());
    assert!(matches!(db.create_table_sql(&[]), Err(Error::Argument(_))));
}

#[test]
fn create_table_runs_in_one_transaction() {
    let conn = RecordingConnection::default();
    let db = open("ql-mem", conn.clone());
    let cx = Cx::for_testing();
    let affected = run(db.create_table(
        &cx,
        &[RecordRef::of::<Hero>(), RecordRef::of::<Villain>()],
    ));
    assert_eq!(unwrap_outcome(affected), 2);

    let state = conn.state();
    assert_eq!(state.began, 1);
    assert_eq!(state.rolled_back, 0);
    assert_eq!(state.committed.len(), 2);
    assert!(state.committed[0].0.starts_with("CREATE TABLE IF NOT EXISTS heroes"));
    assert!(state.committed[1].0.starts_with("CREATE TABLE IF NOT EXISTS villains"));
}

#[test]
fn failed_statement_rolls_back() {
    let conn = RecordingConnection::failing_on("villains");
    let db = open("ql-mem", conn.clone());
    let cx = Cx::for_testing();
    let outcome = run(db.create_table(
        &cx,
        &[RecordRef::of::<Hero>(), RecordRef::of::<Villain>()],
    ));
    assert!(matches!(outcome, Outcome::Err(Error::Execution(_))));

    let state = conn.state();
    assert_eq!(state.began, 1);
    assert_eq!(state.rolled_back, 1);
    assert!(state.committed.is_empty());
}

#[test]
fn failed_rollback_keeps_the_statement_error() {
    let conn = RecordingConnection::failing_on("villains");
    conn.state().fail_rollback = true;
    let db = open("ql-mem", conn.clone());
    let cx = Cx::for_testing();
    let outcome = run(db.create_table(
        &cx,
        &[RecordRef::of::<Hero>(), RecordRef::of::<Villain>()],
    ));
    match outcome {
        Outcome::Err(Error::Execution(e)) => {
            assert!(e.to_string().contains("statement rejected by backend"));
        }
        other => panic!("expected the statement error, got {other:?}"),
    }
    let state = conn.state();
    assert_eq!(state.rolled_back, 1);
    assert!(state.committed.is_empty());
}

#[test]
fn panicking_statement_rolls_back() {
    let conn = RecordingConnection::default();
    conn.state().panic_on = Some("villains".to_string());
    let db = open("sqlite", conn.clone());
    let cx = Cx::for_testing();
    let outcome = run(db.create_table(
        &cx,
        &[RecordRef::of::<Hero>(), RecordRef::of::<Villain>()],
    ));
    assert!(matches!(outcome, Outcome::Panicked(_)));
    let state = conn.state();
    assert_eq!(state.began, 1);
    assert_eq!(state.rolled_back, 1);
    assert!(state.committed.is_empty());
}

#[test]
fn cancelled_context_reaches_no_connection() {
    let conn = RecordingConnection::default();
    let db = open("sqlite", conn.clone());
    let cx = Cx::for_testing();
    cx.set_cancel_requested(true);

    let outcome = run(db.create_table(&cx, &[RecordRef::of::<Hero>()]));
    assert!(matches!(outcome, Outcome::Cancelled(_)));
    let outcome = run(db.create(&cx, &hero(None)));
    assert!(matches!(outcome, Outcome::Cancelled(_)));
    let outcome = run(db.find::<Hero, _>(&cx, |_| {}));
    assert!(matches!(outcome, Outcome::Cancelled(_)));
    let outcome = run(ormscope::exec_tx(&cx, &conn, "DELETE FROM heroes", &[]));
    assert!(matches!(outcome, Outcome::Cancelled(_)));

    let state = conn.state();
    assert_eq!(state.began, 0);
    assert!(state.committed.is_empty());
    assert!(state.queries.is_empty());
}

#[test]
fn drop_table_includes_every_record() {
    let conn = RecordingConnection::default();
    let db = open("sqlite", conn.clone());
    let cx = Cx::for_testing();
    unwrap_outcome(run(db.drop_table(
        &cx,
        &[RecordRef::of::<Hero>(), RecordRef::of::<Villain>()],
    )));
    let state = conn.state();
    let sql: Vec<&str> = state.committed.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(
        sql,
        vec![
            "DROP TABLE IF EXISTS \"heroes\"",
            "DROP TABLE IF EXISTS \"villains\""
        ]
    );
}

#[test]
fn singular_naming_resets_cache() {
    let mut db = open("ql", RecordingConnection::default());
    db.create_table_sql(&[RecordRef::of::<Villain>()]).unwrap();
    assert_eq!(db.cache().len(), 1);

    db.set_singular_table(true);
    assert!(db.cache().is_empty());
    let expr = db.create_table_sql(&[RecordRef::of::<Villain>()]).unwrap();
    assert!(expr.sql.contains("CREATE TABLE IF NOT EXISTS villain ("));

    // Explicit table names ignore the naming mode.
    let expr = db.create_table_sql(&[RecordRef::of::<Hero>()]).unwrap();
    assert!(expr.sql.contains("CREATE TABLE IF NOT EXISTS heroes ("));
}

#[test]
fn concurrent_compilation_shares_metadata() {
    let db = open("postgres", RecordingConnection::default());
    let records = [RecordRef::of::<Hero>(), RecordRef::of::<Villain>()];
    let (db, records) = (&db, &records);
    let outputs: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(move || db.create_table_sql(records).unwrap().sql))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(db.cache().len(), 2);
}

// ============================================================================
// Open
// ============================================================================

#[test]
fn unsupported_dialect_is_reported() {
    let connector = RecordingConnector::default();
    let err = Db::open(
        OpenConfig::new("postgres-unsupported").source("host=localhost"),
        &connector,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedDialect(ref name) if name == "postgres-unsupported"));
    assert!(connector.calls.lock().unwrap().is_empty());
}

#[test]
fn open_passes_driver_and_source() {
    let connector = RecordingConnector::default();
    let db = Db::open(OpenConfig::new("ql-mem").source("test.db"), &connector).unwrap();
    assert_eq!(db.dialect().name(), "ql-mem");
    assert_eq!(
        *connector.calls.lock().unwrap(),
        vec![("ql-mem".to_string(), "test.db".to_string())]
    );

    Db::open(
        OpenConfig::new("sqlite").driver("sqlite3").source("app.db"),
        &connector,
    )
    .unwrap();
    assert_eq!(connector.calls.lock().unwrap()[1].0, "sqlite3");
}

#[test]
fn open_rejects_invalid_config() {
    let connector = RecordingConnector::default();

    let missing = Db::open(OpenConfig::new("ql"), &connector).unwrap_err();
    assert!(matches!(missing, Error::Argument(_)));

    let empty_driver = Db::open(OpenConfig::new("ql").driver("").source("a.db"), &connector);
    assert!(matches!(empty_driver, Err(Error::Argument(_))));

    let both = Db::open_with_connection(
        OpenConfig::new("ql").source("a.db"),
        RecordingConnection::default(),
    );
    assert!(matches!(both, Err(Error::Argument(_))));

    let blank = Db::connect(
        OpenConfig::new("ql"),
        ConnectionSource::Dsn("  ".to_string()),
        &connector,
    );
    assert!(matches!(blank, Err(Error::Argument(_))));
    assert!(connector.calls.lock().unwrap().is_empty());
}

#[test]
fn connect_accepts_an_open_handle() {
    let connector = RecordingConnector::default();
    let conn = RecordingConnection::default();
    let db = Db::connect(
        OpenConfig::new("postgres"),
        ConnectionSource::Handle(conn.clone()),
        &connector,
    )
    .unwrap();
    assert_eq!(db.dialect().name(), "postgres");
    assert!(connector.calls.lock().unwrap().is_empty());
}

// ============================================================================
// CRUD and hooks
// ============================================================================

#[test]
fn create_stamps_timestamps_and_keeps_parity() {
    let db = open("postgres", RecordingConnection::default());
    let expr = db.new_engine().compile_insert(&hero(None)).unwrap();
    assert!(expr.sql.starts_with("INSERT INTO \"heroes\" (\"name\", \"age\", \"created_at\""));
    assert_eq!(
        count_placeholders(&expr.sql, PlaceholderStyle::Dollar),
        expr.args.len()
    );
    assert_eq!(expr.args[0], Value::from("Deadpond"));
    assert!(!expr.args[2].is_null());
}

#[test]
fn create_executes_through_transaction() {
    let conn = RecordingConnection::default();
    let db = open("sqlite", conn.clone());
    let cx = Cx::for_testing();
    unwrap_outcome(run(db.create(&cx, &hero(None))));

    let state = conn.state();
    assert_eq!(state.began, 1);
    assert_eq!(state.committed.len(), 1);
    let (sql, args) = &state.committed[0];
    assert!(sql.starts_with("INSERT INTO \"heroes\""));
    assert_eq!(count_placeholders(sql, PlaceholderStyle::Question), *args);
}

#[test]
fn failing_hook_stops_before_the_connection() {
    let conn = RecordingConnection::default();
    let mut db = open("sqlite", conn.clone());
    let after_ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&after_ran);
    db.hooks_mut()
        .register(OperationKind::Create, Phase::Before, "validate", |_| {
            Err(Error::argument("name is reserved"))
        })
        .register(OperationKind::Create, Phase::After, "audit", move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

    let cx = Cx::for_testing();
    let outcome = run(db.create(&cx, &hero(None)));
    assert!(matches!(outcome, Outcome::Err(Error::Hook { ref stage, .. }) if stage == "validate"));
    assert!(!*after_ran.lock().unwrap());

    let state = conn.state();
    assert_eq!(state.began, 0);
    assert!(state.committed.is_empty());

    // Other databases keep the process-wide defaults.
    assert!(
        !HookRegistry::global()
            .stage_names(OperationKind::Create, Phase::Before)
            .contains(&"validate")
    );
}

#[test]
fn find_scopes_out_soft_deleted_rows() {
    let conn = RecordingConnection::default();
    let db = open("postgres", conn.clone());
    let cx = Cx::for_testing();
    unwrap_outcome(run(db.find::<Hero, _>(&cx, |search| {
        search.where_("age > ?", vec![Value::from(18)]).limit(10);
    })));
    unwrap_outcome(run(db.find::<Hero, _>(&cx, |search| {
        search.unscoped();
    })));
    unwrap_outcome(run(db.find::<Villain, _>(&cx, |_| {})));

    let state = conn.state();
    assert_eq!(
        state.queries[0].0,
        "SELECT * FROM \"heroes\" WHERE \"deleted_at\" IS NULL AND ((age > $1)) LIMIT 10"
    );
    assert_eq!(state.queries[0].1, vec![Value::from(18)]);
    assert_eq!(state.queries[1].0, "SELECT * FROM \"heroes\"");
    assert_eq!(state.queries[2].0, "SELECT * FROM \"villains\"");
}

#[test]
fn delete_is_soft_when_record_has_deleted_at() {
    let db = open("postgres", RecordingConnection::default());
    let expr = db.new_engine().compile_delete(&hero(Some(7))).unwrap();
    assert_eq!(
        expr.sql,
        "UPDATE \"heroes\" SET \"deleted_at\" = $1 WHERE \"deleted_at\" IS NULL AND ((id = $2))"
    );
    assert!(matches!(expr.args[0], Value::Timestamp(_)));
    assert_eq!(expr.args[1], Value::from(7i64));

    let villain = Villain {
        id: Some(3),
        name: "Ghost".to_string(),
    };
    let expr = db.new_engine().compile_delete(&villain).unwrap();
    assert_eq!(expr.sql, "DELETE FROM \"villains\" WHERE (id = $1)");
}

#[test]
fn unscoped_delete_is_hard() {
    let db = open("sqlite", RecordingConnection::default());
    let mut engine = db.new_engine();
    engine.search().unscoped();
    let expr = engine.compile_delete(&hero(Some(7))).unwrap();
    assert_eq!(expr.sql, "DELETE FROM \"heroes\" WHERE (id = ?)");
}

#[test]
fn update_and_delete_require_a_key() {
    let conn = RecordingConnection::default();
    let db = open("sqlite", conn.clone());
    assert!(matches!(
        db.new_engine().compile_update(&hero(None)),
        Err(Error::Argument(_))
    ));
    assert!(matches!(
        db.new_engine().compile_delete(&hero(None)),
        Err(Error::Argument(_))
    ));

    let cx = Cx::for_testing();
    let outcome = run(db.update(&cx, &hero(None)));
    assert!(matches!(outcome, Outcome::Err(Error::Argument(_))));
    assert_eq!(conn.state().began, 0);
}

#[test]
fn zero_key_is_treated_as_unset() {
    let conn = RecordingConnection::default();
    let db = open("postgres", conn.clone());
    let expr = db.new_engine().compile_insert(&hero(Some(0))).unwrap();
    assert!(expr.sql.starts_with("INSERT INTO \"heroes\" (\"name\""));
    assert!(!expr.args.contains(&Value::BigInt(0)));

    let cx = Cx::for_testing();
    let outcome = run(db.update(&cx, &hero(Some(0))));
    assert!(matches!(outcome, Outcome::Err(Error::Argument(_))));
    let outcome = run(db.delete(&cx, &hero(Some(0))));
    assert!(matches!(outcome, Outcome::Err(Error::Argument(_))));
    assert_eq!(conn.state().began, 0);
}

#[test]
fn update_keys_on_primary_key() {
    let db = open("postgres", RecordingConnection::default());
    let expr = db.new_engine().compile_update(&hero(Some(9))).unwrap();
    assert!(expr.sql.starts_with("UPDATE \"heroes\" SET \"name\" = $1, \"age\" = $2"));
    assert!(expr.sql.ends_with("WHERE (id = $5)"));
    assert_eq!(
        count_placeholders(&expr.sql, PlaceholderStyle::Dollar),
        expr.args.len()
    );
}

#[test]
fn invalid_search_identifier_fails_the_operation() {
    let db = open("sqlite", RecordingConnection::default());
    let mut engine = db.new_engine();
    engine.search().table("heroes; DROP TABLE heroes");
    assert!(matches!(
        engine.compile_query::<Hero>(),
        Err(Error::Argument(_))
    ));
}
