use sqlparser::ast::{self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::Ms;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertReservation {
        id: Ulid,
        room_id: Ulid,
        start: Ms,
        end: Ms,
        requester: String,
        note: Option<String>,
    },
    /// Reschedule: UPDATE reservations SET start, "end" WHERE id.
    UpdateReservation {
        id: Ulid,
        start: Ms,
        end: Ms,
    },
    /// UPDATE reservations SET status = 'confirmed' WHERE id.
    ConfirmReservation {
        id: Ulid,
    },
    /// DELETE is a soft cancel; the record survives for audit.
    CancelReservation {
        id: Ulid,
    },
    SelectReservation {
        id: Ulid,
    },
    SelectReservations {
        room_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectAvailability {
        room_id: Ulid,
        start: Ms,
        end: Ms,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(table, assignments, selection)
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

const RESERVATION_COLUMNS: [&str; 6] = ["id", "room_id", "start", "end", "requester", "note"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }

    let row = extract_insert_values(insert)?;
    let values = bind_insert_columns(&insert.columns, row)?;
    if values.len() < 5 {
        return Err(SqlError::WrongArity("reservations", 5, values.len()));
    }
    let note = if values.len() >= 6 {
        parse_string_or_null(&values[5])?
    } else {
        None
    };
    Ok(Command::InsertReservation {
        id: parse_ulid(&values[0])?,
        room_id: parse_ulid(&values[1])?,
        start: parse_i64(&values[2])?,
        end: parse_i64(&values[3])?,
        requester: parse_string(&values[4])?,
        note,
    })
}

/// Reorder a VALUES row into canonical column order when the INSERT names
/// its columns, so `(room_id, id, ...)` binds by name instead of position.
/// Without a column list the row is taken positionally. `note` is the only
/// optional column.
fn bind_insert_columns(
    columns: &[ast::Ident],
    row: Vec<Expr>,
) -> Result<Vec<Expr>, SqlError> {
    if columns.is_empty() {
        return Ok(row);
    }
    if columns.len() != row.len() {
        return Err(SqlError::WrongArity("reservations", columns.len(), row.len()));
    }

    let mut slots: Vec<Option<Expr>> = vec![None; RESERVATION_COLUMNS.len()];
    for (ident, expr) in columns.iter().zip(row) {
        let col = ident.value.to_lowercase();
        let Some(pos) = RESERVATION_COLUMNS.iter().position(|c| *c == col) else {
            return Err(SqlError::Unsupported(format!("INSERT column {col}")));
        };
        if slots[pos].replace(expr).is_some() {
            return Err(SqlError::Parse(format!("duplicate column {col}")));
        }
    }

    let given = slots.iter().filter(|s| s.is_some()).count();
    let mut out = Vec::with_capacity(given);
    for (slot, col) in slots.into_iter().zip(RESERVATION_COLUMNS) {
        match slot {
            Some(expr) => out.push(expr),
            None if col == "note" => {}
            None => return Err(SqlError::WrongArity("reservations", 5, given)),
        }
    }
    Ok(out)
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "reservations" {
        return Err(SqlError::UnknownTable(name));
    }
    let id = extract_where_id(selection)?;

    let (mut start, mut end, mut status) = (None, None, None);
    for assignment in assignments {
        let col = assignment_column(&assignment.target)?;
        match col.as_str() {
            "start" => start = Some(parse_i64_expr(&assignment.value)?),
            "end" => end = Some(parse_i64_expr(&assignment.value)?),
            "status" => status = Some(parse_string(&assignment.value)?),
            other => return Err(SqlError::Unsupported(format!("SET {other}"))),
        }
    }

    match (start, end, status) {
        (Some(start), Some(end), None) => Ok(Command::UpdateReservation { id, start, end }),
        (None, None, Some(status)) if status == "confirmed" => {
            Ok(Command::ConfirmReservation { id })
        }
        (None, None, Some(status)) => {
            Err(SqlError::Unsupported(format!("SET status = '{status}'")))
        }
        (None, None, None) => Err(SqlError::MissingFilter("start")),
        _ => Err(SqlError::Unsupported(
            "UPDATE must set either start and \"end\", or status alone".into(),
        )),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_id(&delete.selection)?;
    Ok(Command::CancelReservation { id })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let (mut id, mut room_id, mut start, mut end) = (None, None, None, None);
    if let Some(selection) = &select.selection {
        extract_select_filters(selection, &mut id, &mut room_id, &mut start, &mut end)?;
    }

    match table.as_str() {
        "reservations" => {
            if let Some(id) = id {
                return Ok(Command::SelectReservation { id });
            }
            Ok(Command::SelectReservations {
                room_id: room_id.ok_or(SqlError::MissingFilter("room_id"))?,
                start: start.ok_or(SqlError::MissingFilter("start"))?,
                end: end.ok_or(SqlError::MissingFilter("end"))?,
            })
        }
        "availability" => Ok(Command::SelectAvailability {
            room_id: room_id.ok_or(SqlError::MissingFilter("room_id"))?,
            start: start.ok_or(SqlError::MissingFilter("start"))?,
            end: end.ok_or(SqlError::MissingFilter("end"))?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_select_filters(
    expr: &Expr,
    id: &mut Option<Ulid>,
    room_id: &mut Option<Ulid>,
    start: &mut Option<Ms>,
    end: &mut Option<Ms>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_select_filters(left, id, room_id, start, end)?;
                extract_select_filters(right, id, room_id, start, end)?;
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left);
                if col.as_deref() == Some("id") {
                    *id = Some(parse_ulid_expr(right)?);
                } else if col.as_deref() == Some("room_id") {
                    *room_id = Some(parse_ulid_expr(right)?);
                }
            }
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("start") {
                    *start = Some(parse_i64_expr(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("end") {
                    *end = Some(parse_i64_expr(right)?);
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(target: &AssignmentTarget) -> Result<String, SqlError> {
    match target {
        AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        _ => Err(SqlError::Parse("unsupported assignment target".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    parse_ulid_expr(expr)
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    parse_i64_expr(expr)
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) => Ok(Some(s.clone())),
            _ => Err(SqlError::Parse(format!(
                "expected string or NULL, got {value:?}"
            ))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const U: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_reservation() {
        let sql = format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{U}', '{U}', 1000, 2000, 'alice')"#
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReservation { id, start, end, requester, note, .. } => {
                assert_eq!(id.to_string(), U);
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
                assert_eq!(requester, "alice");
                assert_eq!(note, None);
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_with_note() {
        let sql = format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester, note) VALUES ('{U}', '{U}', 1000, 2000, 'alice', 'standup')"#
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReservation { note, .. } => {
                assert_eq!(note.as_deref(), Some("standup"));
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_with_null_note() {
        let sql = format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester, note) VALUES ('{U}', '{U}', 1000, 2000, 'alice', NULL)"#
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReservation { note, .. } => assert_eq!(note, None),
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reordered_columns_bind_by_name() {
        const R: &str = "01BX5ZZKBKACTAV9WEVGEMMVRY";
        let sql = format!(
            r#"INSERT INTO reservations (room_id, id, "end", start, requester) VALUES ('{R}', '{U}', 2000, 1000, 'alice')"#
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReservation { id, room_id, start, end, requester, .. } => {
                assert_eq!(id.to_string(), U);
                assert_eq!(room_id.to_string(), R);
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
                assert_eq!(requester, "alice");
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_unknown_column_errors() {
        let sql = format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", owner) VALUES ('{U}', '{U}', 1000, 2000, 'alice')"#
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_insert_too_few_values_errors() {
        let sql = format!("INSERT INTO reservations (id) VALUES ('{U}')");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::WrongArity("reservations", 5, 1))
        ));
    }

    #[test]
    fn parse_reschedule_update() {
        let sql = format!(r#"UPDATE reservations SET start = 3000, "end" = 4000 WHERE id = '{U}'"#);
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateReservation { id, start, end } => {
                assert_eq!(id.to_string(), U);
                assert_eq!(start, 3000);
                assert_eq!(end, 4000);
            }
            _ => panic!("expected UpdateReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_confirm_update() {
        let sql = format!("UPDATE reservations SET status = 'confirmed' WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::ConfirmReservation { .. }));
    }

    #[test]
    fn parse_update_other_status_errors() {
        let sql = format!("UPDATE reservations SET status = 'canceled' WHERE id = '{U}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_mixing_window_and_status_errors() {
        let sql =
            format!("UPDATE reservations SET start = 3000, status = 'confirmed' WHERE id = '{U}'");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_update_without_id_errors() {
        let sql = r#"UPDATE reservations SET start = 3000, "end" = 4000"#;
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_delete_as_cancel() {
        let sql = format!("DELETE FROM reservations WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::CancelReservation { id } => assert_eq!(id.to_string(), U),
            _ => panic!("expected CancelReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_by_id() {
        let sql = format!("SELECT * FROM reservations WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::SelectReservation { .. }));
    }

    #[test]
    fn parse_select_by_room_and_range() {
        let sql = format!(
            "SELECT * FROM reservations WHERE room_id = '{U}' AND start >= 1000 AND \"end\" <= 2000"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectReservations { room_id, start, end } => {
                assert_eq!(room_id.to_string(), U);
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
            }
            _ => panic!("expected SelectReservations, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_reservations_without_range_errors() {
        let sql = format!("SELECT * FROM reservations WHERE room_id = '{U}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter("start"))
        ));
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            "SELECT * FROM availability WHERE room_id = '{U}' AND start >= 1000 AND \"end\" <= 2000"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAvailability { room_id, start, end } => {
                assert_eq!(room_id.to_string(), U);
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
            }
            _ => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_listen() {
        let sql = format!("LISTEN room_{U}");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::Listen { channel } => assert_eq!(channel, format!("room_{U}")),
            _ => panic!("expected Listen, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{U}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
