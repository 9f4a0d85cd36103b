//! ODBC adapter (network-driver backend)

use std::sync::OnceLock;
use odbc_api::{
    buffers::BufferDesc, parameter::InputParameter, Bit, Connection, ConnectionOptions, Cursor, DataType,
    Environment, IntoParameter, Nullable, ResultSetMetadata,
};
use super::{Backend, BackendKind, DatabaseError, Identity};
use crate::connect::Credentials;
use crate::value::{Row, Value};

/// SQLSTATE for "base table or view not found"
const TABLE_NOT_FOUND: &[u8; 5] = b"42S02";

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// Process-wide ODBC environment; connections borrow it for `'static`.
pub fn environment() -> Result<&'static Environment, odbc_api::Error> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new()?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// Network-driver backend over an `odbc_api::Connection`.
///
/// Autocommit is switched off on adoption so every write stays pending until
/// `commit` or `rollback`.
pub struct OdbcBackend {
    conn: Connection<'static>,
    identity: Identity,
    fast_executemany: bool,
}

impl OdbcBackend {
    /// Adopt an open connection.
    pub fn new(conn: Connection<'static>) -> Result<Self, DatabaseError> {
        conn.set_autocommit(false)?;
        let identity = Identity {
            server: None,
            database: conn.current_catalog().ok(),
        };
        Ok(Self {
            conn,
            identity,
            fast_executemany: false,
        })
    }

    /// Open a new connection from a full credential set.
    pub fn connect(credentials: &Credentials) -> Result<Self, DatabaseError> {
        let conn = environment()?
            .connect_with_connection_string(&credentials.connection_string(), ConnectionOptions::default())?;
        let mut backend = Self::new(conn)?;
        backend.identity = Identity {
            server: Some(credentials.server.clone()),
            database: Some(credentials.database.clone()),
        };
        Ok(backend)
    }

    /// One execution for the whole batch, parameters bound as column arrays.
    fn insert_columnar(&mut self, sql: &str, rows: &[Row], layout: &[ColumnLayout]) -> Result<(), odbc_api::Error> {
        let prepared = self.conn.prepare(sql)?;
        let descs = layout.iter().map(|column| column.buffer_desc());
        let mut inserter = prepared.into_column_inserter(rows.len(), descs)?;
        inserter.set_num_rows(rows.len());

        for (col, column) in layout.iter().enumerate() {
            let values = rows.iter().map(|row| &row[col]);
            match column {
                ColumnLayout::Integer => {
                    let mut view = inserter.column_mut(col).as_nullable_slice::<i64>().expect("i64 buffer");
                    for (i, value) in values.enumerate() {
                        view.set_cell(i, value.as_i64());
                    }
                }
                ColumnLayout::Float => {
                    let mut view = inserter.column_mut(col).as_nullable_slice::<f64>().expect("f64 buffer");
                    for (i, value) in values.enumerate() {
                        let cell = match value {
                            Value::Real(r) => Some(*r),
                            Value::Integer(n) => Some(*n as f64),
                            _ => None,
                        };
                        view.set_cell(i, cell);
                    }
                }
                ColumnLayout::Bit => {
                    let mut view = inserter.column_mut(col).as_nullable_slice::<Bit>().expect("bit buffer");
                    for (i, value) in values.enumerate() {
                        let cell = match value {
                            Value::Bool(b) => Some(Bit::from_bool(*b)),
                            _ => None,
                        };
                        view.set_cell(i, cell);
                    }
                }
                ColumnLayout::Text { .. } => {
                    let mut view = inserter.column_mut(col).as_text_view().expect("text buffer");
                    for (i, value) in values.enumerate() {
                        view.set_cell(i, value.as_str().map(str::as_bytes));
                    }
                }
                ColumnLayout::Binary { .. } => {
                    let mut view = inserter.column_mut(col).as_bin_view().expect("binary buffer");
                    for (i, value) in values.enumerate() {
                        let cell = match value {
                            Value::Blob(b) => Some(b.as_slice()),
                            _ => None,
                        };
                        view.set_cell(i, cell);
                    }
                }
            }
        }

        inserter.execute()?;
        Ok(())
    }

    fn insert_per_row(&mut self, sql: &str, rows: &[Row]) -> Result<(), odbc_api::Error> {
        let mut prepared = self.conn.prepare(sql)?;
        for row in rows {
            let params = to_parameters(row);
            prepared.execute(params.as_slice())?;
        }
        Ok(())
    }
}

fn to_parameter(value: &Value) -> Box<dyn InputParameter> {
    match value {
        Value::Null => Box::new(None::<String>.into_parameter()),
        Value::Integer(i) => Box::new(*i),
        Value::Real(r) => Box::new(*r),
        Value::Text(s) => Box::new(s.clone().into_parameter()),
        Value::Blob(b) => Box::new(b.clone().into_parameter()),
        Value::Bool(b) => Box::new(Bit::from_bool(*b)),
    }
}

fn to_parameters(row: &Row) -> Vec<Box<dyn InputParameter>> {
    row.iter().map(to_parameter).collect()
}

/// Buffer type of one parameter column in a columnar insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnLayout {
    Integer,
    Float,
    Bit,
    Text { max_len: usize },
    Binary { max_len: usize },
}

impl ColumnLayout {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Integer(_) => Some(ColumnLayout::Integer),
            Value::Real(_) => Some(ColumnLayout::Float),
            Value::Bool(_) => Some(ColumnLayout::Bit),
            Value::Text(s) => Some(ColumnLayout::Text { max_len: s.len() }),
            Value::Blob(b) => Some(ColumnLayout::Binary { max_len: b.len() }),
        }
    }

    /// Widen to hold both; `None` when the two cannot share a buffer.
    fn merge(self, other: Self) -> Option<Self> {
        match (self, other) {
            (ColumnLayout::Integer, ColumnLayout::Integer) => Some(ColumnLayout::Integer),
            (ColumnLayout::Integer | ColumnLayout::Float, ColumnLayout::Integer | ColumnLayout::Float) => {
                Some(ColumnLayout::Float)
            }
            (ColumnLayout::Bit, ColumnLayout::Bit) => Some(ColumnLayout::Bit),
            (ColumnLayout::Text { max_len: a }, ColumnLayout::Text { max_len: b }) => {
                Some(ColumnLayout::Text { max_len: a.max(b) })
            }
            (ColumnLayout::Binary { max_len: a }, ColumnLayout::Binary { max_len: b }) => {
                Some(ColumnLayout::Binary { max_len: a.max(b) })
            }
            _ => None,
        }
    }

    fn buffer_desc(self) -> BufferDesc {
        match self {
            ColumnLayout::Integer => BufferDesc::I64 { nullable: true },
            ColumnLayout::Float => BufferDesc::F64 { nullable: true },
            ColumnLayout::Bit => BufferDesc::Bit { nullable: true },
            ColumnLayout::Text { max_len } => BufferDesc::Text { max_str_len: max_len.max(1) },
            ColumnLayout::Binary { max_len } => BufferDesc::Binary { length: max_len.max(1) },
        }
    }
}

/// Column buffers for a batch, or `None` when rows are ragged or a column
/// mixes types that cannot share one buffer.
fn bulk_layout(rows: &[Row]) -> Option<Vec<ColumnLayout>> {
    let width = rows.first()?.len();
    if width == 0 || rows.iter().any(|row| row.len() != width) {
        return None;
    }

    (0..width)
        .map(|col| {
            let mut layout: Option<ColumnLayout> = None;
            for value in rows.iter().map(|row| &row[col]) {
                let Some(next) = ColumnLayout::of(value) else {
                    continue;
                };
                layout = Some(match layout {
                    Some(current) => current.merge(next)?,
                    None => next,
                });
            }
            Some(layout.unwrap_or(ColumnLayout::Text { max_len: 1 }))
        })
        .collect()
}

/// How a result column is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnClass {
    Integer,
    Bit,
    Float,
    Binary,
    Text,
}

fn column_class(data_type: DataType) -> ColumnClass {
    match data_type {
        DataType::TinyInt { .. } | DataType::SmallInt { .. } | DataType::Integer { .. } | DataType::BigInt { .. } => {
            ColumnClass::Integer
        }
        DataType::Bit { .. } => ColumnClass::Bit,
        DataType::Real { .. } | DataType::Float { .. } | DataType::Double { .. } => ColumnClass::Float,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => ColumnClass::Binary,
        // Decimal and Numeric keep their exact digits as text
        _ => ColumnClass::Text,
    }
}

fn is_table_not_found(err: &DatabaseError) -> bool {
    match err {
        DatabaseError::Odbc(odbc_api::Error::Diagnostics { record, .. }) => &record.state.0 == TABLE_NOT_FOUND,
        _ => false,
    }
}

impl Backend for OdbcBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NetworkDriver
    }

    fn identity(&self) -> Identity {
        self.identity.clone()
    }

    /// Bind each batch as parameter arrays and execute it once.
    fn enable_bulk_insert(&mut self) -> bool {
        self.fast_executemany = true;
        true
    }

    fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        let mut prepared = self.conn.prepare(sql)?;
        prepared.execute(())?;
        Ok(())
    }

    fn execute_many(&mut self, sql: &str, rows: &[Row]) -> Result<(), DatabaseError> {
        if rows.is_empty() {
            return Ok(());
        }
        let layout = if self.fast_executemany { bulk_layout(rows) } else { None };
        match layout {
            Some(layout) => self.insert_columnar(sql, rows, &layout)?,
            None => self.insert_per_row(sql, rows)?,
        }
        Ok(())
    }

    fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>, DatabaseError> {
        let mut prepared = self.conn.prepare(sql)?;
        let mut result = Vec::new();

        let Some(mut cursor) = prepared.execute(())? else {
            return Ok(result);
        };
        let columns = cursor.num_result_cols()? as u16;
        let classes = (1..=columns)
            .map(|col| cursor.col_data_type(col).map(column_class))
            .collect::<Result<Vec<_>, _>>()?;

        let mut buf = Vec::new();
        while let Some(mut row) = cursor.next_row()? {
            let mut values = Vec::with_capacity(classes.len());
            for (col, class) in (1..=columns).zip(&classes) {
                let value = match class {
                    ColumnClass::Integer => {
                        let mut cell = Nullable::<i64>::null();
                        row.get_data(col, &mut cell)?;
                        cell.into_opt().map_or(Value::Null, Value::Integer)
                    }
                    ColumnClass::Bit => {
                        let mut cell = Nullable::<Bit>::null();
                        row.get_data(col, &mut cell)?;
                        cell.into_opt().map_or(Value::Null, |bit| Value::Bool(bit.as_bool()))
                    }
                    ColumnClass::Float => {
                        let mut cell = Nullable::<f64>::null();
                        row.get_data(col, &mut cell)?;
                        cell.into_opt().map_or(Value::Null, Value::Real)
                    }
                    ColumnClass::Binary => {
                        if row.get_binary(col, &mut buf)? {
                            Value::Blob(buf.clone())
                        } else {
                            Value::Null
                        }
                    }
                    ColumnClass::Text => {
                        if row.get_text(col, &mut buf)? {
                            Value::Text(String::from_utf8_lossy(&buf).into_owned())
                        } else {
                            Value::Null
                        }
                    }
                };
                values.push(value);
            }
            result.push(values);
        }
        Ok(result)
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        self.conn.commit()?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.conn.rollback()?;
        Ok(())
    }

    /// Ends the transaction explicitly so driver errors reach the caller, then
    /// lets `Connection`'s `Drop` disconnect. odbc-api exposes no fallible
    /// disconnect, so a failure at that last step cannot be returned here.
    fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.rollback()?;
        Ok(())
    }

    fn is_missing_table(&self, err: &DatabaseError) -> bool {
        is_table_not_found(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odbc_api::handles::{DiagnosticRecord, HasDataType, State};

    fn diagnostics(state: &[u8; 5]) -> DatabaseError {
        DatabaseError::Odbc(odbc_api::Error::Diagnostics {
            record: DiagnosticRecord {
                state: State(*state),
                native_error: 208,
                message: b"Invalid object name 'notes'.".to_vec(),
            },
            function: "SQLExecDirect",
        })
    }

    #[test]
    fn test_table_not_found_state() {
        assert!(is_table_not_found(&diagnostics(b"42S02")));
        assert!(!is_table_not_found(&diagnostics(b"42000")));

        let sqlite = DatabaseError::Sqlite(rusqlite::Error::InvalidQuery);
        assert!(!is_table_not_found(&sqlite));
    }

    #[test]
    fn test_parameter_types() {
        assert_eq!(to_parameter(&Value::Integer(7)).data_type(), DataType::BigInt);
        assert_eq!(to_parameter(&Value::Real(2.5)).data_type(), DataType::Double);
        assert_eq!(to_parameter(&Value::Bool(true)).data_type(), DataType::Bit);
        assert!(matches!(to_parameter(&Value::from("note")).data_type(), DataType::Varchar { .. }));
        assert!(matches!(to_parameter(&Value::Null).data_type(), DataType::Varchar { .. }));
        assert!(matches!(to_parameter(&Value::Blob(vec![1, 2])).data_type(), DataType::Varbinary { .. }));
        assert_eq!(to_parameters(&vec![Value::Null, Value::Integer(1)]).len(), 2);
    }

    #[test]
    fn test_bulk_layout_widens_columns() {
        let rows = vec![
            vec![Value::Integer(1), Value::Integer(1), Value::from("ab"), Value::Null, Value::Bool(true)],
            vec![Value::Integer(2), Value::Real(0.5), Value::from("abcd"), Value::Blob(vec![0; 3]), Value::Null],
            vec![Value::Null, Value::Integer(3), Value::Null, Value::Null, Value::Bool(false)],
        ];
        assert_eq!(
            bulk_layout(&rows),
            Some(vec![
                ColumnLayout::Integer,
                ColumnLayout::Float,
                ColumnLayout::Text { max_len: 4 },
                ColumnLayout::Binary { max_len: 3 },
                ColumnLayout::Bit,
            ])
        );
    }

    #[test]
    fn test_bulk_layout_falls_back() {
        // mixed text and integer in one column
        let mixed = vec![vec![Value::from("a")], vec![Value::Integer(1)]];
        assert_eq!(bulk_layout(&mixed), None);

        let ragged = vec![vec![Value::Integer(1), Value::Integer(2)], vec![Value::Integer(3)]];
        assert_eq!(bulk_layout(&ragged), None);

        assert_eq!(bulk_layout(&[]), None);
        assert_eq!(bulk_layout(&[vec![]]), None);
    }

    #[test]
    fn test_all_null_column_gets_text_buffer() {
        let rows = vec![vec![Value::Null], vec![Value::Null]];
        let layout = bulk_layout(&rows).unwrap();
        assert_eq!(layout, vec![ColumnLayout::Text { max_len: 1 }]);
        assert!(matches!(layout[0].buffer_desc(), BufferDesc::Text { max_str_len: 1 }));
    }

    #[test]
    fn test_column_classes() {
        assert_eq!(column_class(DataType::Integer), ColumnClass::Integer);
        assert_eq!(column_class(DataType::BigInt), ColumnClass::Integer);
        assert_eq!(column_class(DataType::Bit), ColumnClass::Bit);
        assert_eq!(column_class(DataType::Double), ColumnClass::Float);
        assert_eq!(column_class(DataType::Real), ColumnClass::Float);
        assert_eq!(column_class(DataType::Date), ColumnClass::Text);
        assert_eq!(column_class(DataType::Unknown), ColumnClass::Text);
    }
}
