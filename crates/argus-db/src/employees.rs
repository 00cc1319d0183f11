//! Employee repository.

use argus_models::{Employee, EmployeeId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::DbResult;

/// Provides employee master-data queries.
pub struct EmployeeRepository;

impl EmployeeRepository {
    pub async fn get(
        conn: &mut SqliteConnection,
        id: EmployeeId,
    ) -> DbResult<Option<Employee>> {
        let row = sqlx::query(
            "SELECT id, employee_code, name, department, position, phone_number, \
             is_active, supervisor_id FROM employees WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(row_to_employee).transpose()
    }

    pub async fn list_active(conn: &mut SqliteConnection) -> DbResult<Vec<Employee>> {
        let rows = sqlx::query(
            "SELECT id, employee_code, name, department, position, phone_number, \
             is_active, supervisor_id FROM employees WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(row_to_employee).collect()
    }

    /// Insert a new employee, returning its id.
    pub async fn insert(conn: &mut SqliteConnection, emp: &Employee) -> DbResult<EmployeeId> {
        let result = sqlx::query(
            "INSERT INTO employees \
             (employee_code, name, department, position, phone_number, is_active, supervisor_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&emp.employee_code)
        .bind(&emp.name)
        .bind(&emp.department)
        .bind(&emp.position)
        .bind(&emp.phone_number)
        .bind(emp.is_active)
        .bind(emp.supervisor_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Soft-deactivate; per-employee rows stay until a hard delete cascades.
    pub async fn set_active(
        conn: &mut SqliteConnection,
        id: EmployeeId,
        is_active: bool,
    ) -> DbResult<bool> {
        let result = sqlx::query("UPDATE employees SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_employee(row: &SqliteRow) -> DbResult<Employee> {
    Ok(Employee {
        id: row.try_get("id")?,
        employee_code: row.try_get("employee_code")?,
        name: row.try_get("name")?,
        department: row.try_get("department")?,
        position: row.try_get("position")?,
        phone_number: row.try_get("phone_number")?,
        is_active: row.try_get("is_active")?,
        supervisor_id: row.try_get("supervisor_id")?,
    })
}
