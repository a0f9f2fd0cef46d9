// ABOUTME: SQL Server change source backed by the native CDC table-valued functions
// ABOUTME: Wraps a tiberius client and implements ChangeSource over it

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use std::future::Future;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::values::row_to_column_map;
use crate::changes::{
    metadata, CaptureTable, CapturedColumn, CdcError, ChangeMode, ChangeQuery, ChangeSource, ColumnMap,
    ColumnValue, Lsn, RelationalOperator, Result, UpdateMask,
};
use crate::config::ConnectionConfig;

/// The tiberius client type produced by [`SqlServerSource::connect`].
pub type TdsClient = Client<Compat<TcpStream>>;

const MAX_IDENTIFIER_LENGTH: usize = 128;
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const BINARY_COLUMNS_SQL: &str = "\
SELECT cc.column_name
FROM cdc.captured_columns cc
JOIN cdc.change_tables ct ON ct.object_id = cc.object_id
JOIN sys.columns c ON c.object_id = ct.source_object_id AND c.name = cc.column_name
JOIN sys.types t ON t.user_type_id = c.user_type_id
WHERE ct.capture_instance = @P1
    AND t.name IN ('image', 'varbinary', 'binary')
ORDER BY cc.column_ordinal";

const CAPTURE_TABLES_SQL: &str = "\
SELECT o.name, t.capture_instance, t.supports_net_changes
FROM cdc.change_tables t
JOIN sys.objects o ON o.object_id = t.source_object_id
WHERE o.type = 'U'";

const CAPTURED_COLUMNS_SQL: &str = "\
SELECT cc.column_name, cc.column_ordinal, cc.column_type, cc.is_computed
FROM cdc.captured_columns cc
JOIN cdc.change_tables ct ON ct.object_id = cc.object_id
WHERE ct.capture_instance = @P1
ORDER BY cc.column_ordinal";

/// [`ChangeSource`] over a live SQL Server connection.
///
/// The source owns nothing but the client handed to it, and every method is a
/// single round trip bounded by the command timeout. Use
/// [`into_inner`](Self::into_inner) to take the connection back.
pub struct SqlServerSource {
    client: TdsClient,
    command_timeout: Duration,
    stalled: bool,
}

impl SqlServerSource {
    pub fn new(client: TdsClient) -> Self {
        Self {
            client,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            stalled: false,
        }
    }

    /// Bound every round trip by `command_timeout`.
    ///
    /// A timed out query is abandoned on the client only. SQL Server keeps
    /// running it and the connection stays busy until the pending result has
    /// drained, so the source refuses further queries after a timeout. Drop it
    /// and connect again.
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Open a new connection described by `config`.
    pub async fn connect(config: &ConnectionConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let tiberius_config = tiberius_config(config)?;
        let addr = tiberius_config.get_addr();

        tracing::debug!("Connecting to SQL Server at {}", addr);

        let tcp = TcpStream::connect(addr.as_str())
            .await
            .with_context(|| format!("Failed to open TCP connection to {}", addr))?;
        tcp.set_nodelay(true)
            .context("Failed to disable Nagle on SQL Server socket")?;

        let client = Client::connect(tiberius_config, tcp.compat_write())
            .await
            .with_context(|| format!("Failed to log in to SQL Server at {}", addr))?;

        tracing::info!("Connected to SQL Server at {}", addr);

        Ok(Self::new(client).with_command_timeout(config.command_timeout()))
    }

    pub fn into_inner(self) -> TdsClient {
        self.client
    }

    /// True once a query has timed out and the connection can no longer be
    /// trusted.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Next LSN after `lsn`, usable as the start of a follow-up window.
    pub async fn increment_lsn(&mut self, lsn: &Lsn) -> Result<Option<Lsn>> {
        self.step_lsn("increment", lsn).await
    }

    /// LSN immediately preceding `lsn`.
    pub async fn decrement_lsn(&mut self, lsn: &Lsn) -> Result<Option<Lsn>> {
        self.step_lsn("decrement", lsn).await
    }

    /// Commit time of the transaction at `lsn`.
    pub async fn map_lsn_to_time(&mut self, lsn: &Lsn) -> Result<Option<NaiveDateTime>> {
        require_lsn(lsn)?;
        let rows = self
            .query_rows(
                "SELECT sys.fn_cdc_map_lsn_to_time(@P1)",
                &[&lsn.as_bytes()],
            )
            .await?;
        let time = match rows.first() {
            Some(row) => row
                .try_get::<NaiveDateTime, _>(0)
                .context("fn_cdc_map_lsn_to_time returned a non-datetime value")?,
            None => None,
        };
        Ok(time)
    }

    /// LSN matching `time` under the given relational operator.
    pub async fn map_time_to_lsn(
        &mut self,
        operator: RelationalOperator,
        time: NaiveDateTime,
    ) -> Result<Option<Lsn>> {
        let lsn = self
            .query_lsn(
                "SELECT sys.fn_cdc_map_time_to_lsn(@P1, @P2)",
                &[&operator.as_str(), &time],
            )
            .await?;
        Ok(lsn)
    }

    /// Capture instances grouped by source table, optionally for one table.
    ///
    /// Source names group case-insensitively; the first spelling seen wins.
    pub async fn capture_instances(
        &mut self,
        source_name: Option<&str>,
    ) -> Result<Vec<(String, Vec<CaptureTable>)>> {
        let source_name = source_name.filter(|name| !name.trim().is_empty());
        let rows = match source_name {
            Some(name) => {
                let sql = format!("{}\n    AND o.name = @P1", CAPTURE_TABLES_SQL);
                self.query_rows(&sql, &[&name]).await?
            }
            None => self.query_rows(CAPTURE_TABLES_SQL, &[]).await?,
        };

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            tables.push(CaptureTable {
                source_name: text_at(row, 0)?,
                capture_instance: text_at(row, 1)?,
                supports_net_changes: row
                    .try_get::<bool, _>(2)
                    .context("supports_net_changes is not a bit column")?
                    .unwrap_or(false),
            });
        }

        Ok(group_by_source(tables))
    }

    /// Position of `column` in the update masks of `capture_instance`.
    ///
    /// Returns `None` when the column is not captured.
    pub async fn column_ordinal(
        &mut self,
        capture_instance: &str,
        column: &str,
    ) -> Result<Option<u32>> {
        let rows = self
            .query_rows(
                "SELECT sys.fn_cdc_get_column_ordinal(@P1, @P2)",
                &[&capture_instance, &column],
            )
            .await?;
        let ordinal = match rows.first() {
            Some(row) => row
                .try_get::<i32, _>(0)
                .context("fn_cdc_get_column_ordinal returned a non-integer value")?,
            None => None,
        };
        Ok(captured_ordinal(ordinal))
    }

    /// Whether `update_mask` flags `column` as changed.
    ///
    /// The ordinal comes from the server and the bit is tested locally.
    /// Columns that are not captured never count as changed.
    pub async fn has_column_changed(
        &mut self,
        capture_instance: &str,
        column: &str,
        update_mask: &UpdateMask,
    ) -> Result<bool> {
        let ordinal = self.column_ordinal(capture_instance, column).await?;
        Ok(column_changed(ordinal, update_mask))
    }

    /// Columns tracked by `capture_instance`, in ordinal order.
    pub async fn captured_columns(&mut self, capture_instance: &str) -> Result<Vec<CapturedColumn>> {
        if capture_instance.trim().is_empty() {
            return Err(CdcError::InvalidArgument(
                "capture instance is required".to_string(),
            ));
        }

        let rows = self
            .query_rows(CAPTURED_COLUMNS_SQL, &[&capture_instance])
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let ordinal = row
                .try_get::<i32, _>(1)
                .context("column_ordinal is not an int column")?;
            columns.push(CapturedColumn {
                column_name: text_at(row, 0)?,
                column_ordinal: captured_ordinal(ordinal)
                    .ok_or_else(|| anyhow!("Captured column has no ordinal"))?,
                column_type: text_at(row, 2)?,
                is_computed: row
                    .try_get::<bool, _>(3)
                    .context("is_computed is not a bit column")?
                    .unwrap_or(false),
            });
        }
        Ok(columns)
    }

    async fn step_lsn(&mut self, direction: &str, lsn: &Lsn) -> Result<Option<Lsn>> {
        require_lsn(lsn)?;
        let sql = format!("SELECT sys.fn_cdc_{}_lsn(@P1)", direction);
        let next = self.query_lsn(&sql, &[&lsn.as_bytes()]).await?;
        Ok(next)
    }

    async fn query_rows(&mut self, sql: &str, params: &[&dyn ToSql]) -> anyhow::Result<Vec<Row>> {
        let command_timeout = self.command_timeout;
        let client = &mut self.client;
        let run = async move {
            let stream = client.query(sql, params).await?;
            stream.into_first_result().await
        };

        tracing::trace!("Executing: {}", sql);

        bounded(&mut self.stalled, command_timeout, run)
            .await
            .with_context(|| format!("Query failed: {}", first_line(sql)))
    }

    /// Run a scalar query returning a binary(10) LSN.
    async fn query_lsn(&mut self, sql: &str, params: &[&dyn ToSql]) -> anyhow::Result<Option<Lsn>> {
        let rows = self.query_rows(sql, params).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let bytes = row
            .try_get::<&[u8], _>(0)
            .with_context(|| format!("Expected a binary LSN from {}", first_line(sql)))?;
        Ok(bytes.map(Lsn::from).and_then(Lsn::into_option))
    }

    async fn query_names(&mut self, sql: &str, params: &[&dyn ToSql]) -> anyhow::Result<Vec<String>> {
        let rows = self.query_rows(sql, params).await?;
        rows.iter().map(|row| text_at(row, 0)).collect()
    }
}

#[async_trait]
impl ChangeSource for SqlServerSource {
    async fn fetch_changes(&mut self, query: &ChangeQuery) -> Result<Vec<ColumnMap<ColumnValue>>> {
        validate_identifier(&query.capture_instance)?;
        let sql = changes_sql(query.mode(), &query.capture_instance);

        let rows = self
            .query_rows(
                &sql,
                &[
                    &query.from_lsn.as_bytes(),
                    &query.to_lsn.as_bytes(),
                    &query.filter.as_str(),
                ],
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to read {} changes for {}",
                    query.mode(),
                    query.capture_instance
                )
            })?;

        Ok(rows.into_iter().map(row_to_column_map).collect())
    }

    async fn get_min_lsn(&mut self, capture_instance: &str) -> Result<Option<Lsn>> {
        let lsn = self
            .query_lsn("SELECT sys.fn_cdc_get_min_lsn(@P1)", &[&capture_instance])
            .await?;
        Ok(lsn)
    }

    async fn get_max_lsn(&mut self) -> Result<Option<Lsn>> {
        let lsn = self.query_lsn("SELECT sys.fn_cdc_get_max_lsn()", &[]).await?;
        Ok(lsn)
    }

    async fn resolve_changed_column_names(
        &mut self,
        capture_instance: &str,
        update_mask: &UpdateMask,
    ) -> Result<Vec<String>> {
        let ordinals = update_mask.changed_ordinals();
        let Some(sql) = changed_columns_sql(&ordinals) else {
            return Ok(Vec::new());
        };

        let names = self
            .query_names(&sql, &[&capture_instance])
            .await
            .with_context(|| {
                format!(
                    "Failed to resolve update mask {} for {}",
                    update_mask, capture_instance
                )
            })?;
        Ok(names)
    }

    async fn list_binary_column_names(&mut self, capture_instance: &str) -> Result<Vec<String>> {
        let names = self
            .query_names(BINARY_COLUMNS_SQL, &[&capture_instance])
            .await?;
        Ok(names)
    }

    async fn list_source_names(&mut self, capture_instance: Option<&str>) -> Result<Vec<String>> {
        let capture_instance = capture_instance.filter(|ci| !ci.trim().is_empty());
        let mut sql = String::from(
            "SELECT o.name FROM cdc.change_tables t \
             JOIN sys.objects o ON o.object_id = t.source_object_id WHERE o.type = 'U'",
        );
        let names = match capture_instance {
            Some(ci) => {
                sql.push_str(" AND t.capture_instance = @P1");
                self.query_names(&sql, &[&ci]).await?
            }
            None => self.query_names(&sql, &[]).await?,
        };
        Ok(distinct_ignore_case(names))
    }
}

/// Build the tiberius connection config.
pub fn tiberius_config(config: &ConnectionConfig) -> anyhow::Result<Config> {
    if let Some(connection_string) = &config.connection_string {
        if config.password.is_some() {
            bail!(
                "A password cannot be combined with a connection string; \
                 put it in the connection string"
            );
        }
        return Config::from_ado_string(connection_string)
            .context("Failed to parse SQL Server connection string");
    }

    let Some(password) = &config.password else {
        bail!("Password is required for SQL Server authentication");
    };

    let mut tiberius_config = Config::new();
    tiberius_config.host(&config.host);
    tiberius_config.port(config.port);
    tiberius_config.database(&config.database);
    tiberius_config.application_name(&config.application_name);
    tiberius_config.authentication(AuthMethod::sql_server(&config.username, password));

    if config.encrypt {
        tiberius_config.encryption(EncryptionLevel::Required);
        if config.trust_server_certificate {
            tiberius_config.trust_cert();
        }
    } else {
        tiberius_config.encryption(EncryptionLevel::NotSupported);
    }

    Ok(tiberius_config)
}

/// Capture instance names end up inside a function name and cannot be bound
/// as parameters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CdcError::InvalidArgument(
            "capture instance is required".to_string(),
        ));
    }
    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(CdcError::InvalidArgument(format!(
            "capture instance is {} characters long (max {})",
            name.chars().count(),
            MAX_IDENTIFIER_LENGTH
        )));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(CdcError::InvalidArgument(format!(
            "capture instance '{}' may only contain letters, digits and underscores",
            name
        )));
    }
    Ok(())
}

/// Run `query` under `command_timeout`. A timeout leaves the connection
/// mid-response, so `stalled` is set and every later call fails fast.
async fn bounded<T, F>(
    stalled: &mut bool,
    command_timeout: Duration,
    query: F,
) -> anyhow::Result<T>
where
    F: Future<Output = tiberius::Result<T>>,
{
    if *stalled {
        bail!("Connection abandoned after a timed out query; reconnect to continue");
    }
    match tokio::time::timeout(command_timeout, query).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            *stalled = true;
            tracing::warn!(
                "Query timed out after {:?}; the connection will not be reused",
                command_timeout
            );
            bail!("Query timed out after {:?}", command_timeout)
        }
    }
}

/// The ordering keeps an UpdateOld row ahead of its Update row, since both
/// share `__$start_lsn` and `__$seqval`.
fn changes_sql(mode: ChangeMode, capture_instance: &str) -> String {
    format!(
        "SELECT *, sys.fn_cdc_map_lsn_to_time([{start}]) AS [{time}] \
         FROM cdc.fn_cdc_get_{mode}_changes_{ci}(@P1, @P2, @P3) \
         ORDER BY [{start}], [{seq}], [{op}]",
        start = metadata::START_LSN,
        seq = metadata::SEQ_VAL,
        op = metadata::OPERATION,
        time = metadata::UPDATE_TIME,
        mode = mode.as_str(),
        ci = capture_instance
    )
}

/// Ordinals are integers, so they are inlined rather than bound.
fn changed_columns_sql(ordinals: &[u32]) -> Option<String> {
    if ordinals.is_empty() {
        return None;
    }
    let list = ordinals
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "SELECT cc.column_name
FROM cdc.captured_columns cc
JOIN cdc.change_tables ct ON ct.object_id = cc.object_id
JOIN sys.columns c ON c.object_id = ct.source_object_id AND c.name = cc.column_name
JOIN sys.types t ON t.user_type_id = c.user_type_id
WHERE ct.capture_instance = @P1
    AND cc.column_ordinal IN ({})
    AND c.is_identity = 0
    AND t.name <> 'timestamp'
ORDER BY cc.column_ordinal",
        list
    ))
}

fn require_lsn(lsn: &Lsn) -> Result<()> {
    if lsn.is_empty_or_zero() {
        return Err(CdcError::InvalidArgument("LSN is required".to_string()));
    }
    Ok(())
}

fn text_at(row: &Row, index: usize) -> anyhow::Result<String> {
    row.try_get::<&str, _>(index)
        .with_context(|| format!("Column {} is not a string", index))?
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Column {} is NULL", index))
}

fn first_line(sql: &str) -> &str {
    sql.trim_start().lines().next().unwrap_or_default()
}

/// `fn_cdc_get_column_ordinal` yields NULL or -1 for columns it does not know.
fn captured_ordinal(ordinal: Option<i32>) -> Option<u32> {
    ordinal.and_then(|ordinal| u32::try_from(ordinal).ok()).filter(|&ordinal| ordinal > 0)
}

fn column_changed(ordinal: Option<u32>, update_mask: &UpdateMask) -> bool {
    ordinal.is_some_and(|ordinal| update_mask.is_set(ordinal))
}

fn distinct_ignore_case(names: Vec<String>) -> Vec<String> {
    let mut seen = IndexSet::with_capacity(names.len());
    names
        .into_iter()
        .filter(|name| seen.insert(name.to_ascii_lowercase()))
        .collect()
}

fn group_by_source(tables: Vec<CaptureTable>) -> Vec<(String, Vec<CaptureTable>)> {
    let mut groups: IndexMap<String, (String, Vec<CaptureTable>)> = IndexMap::new();
    for table in tables {
        groups
            .entry(table.source_name.to_ascii_lowercase())
            .or_insert_with(|| (table.source_name.clone(), Vec::new()))
            .1
            .push(table);
    }
    groups.into_values().collect()
}
