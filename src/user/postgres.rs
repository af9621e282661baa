//! Handle database requests.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::user::{
    Role, StorageError, StorageResult, UniqueField, UserRecord, UserRepository,
};

const COLUMNS: &str = "id, full_name, email, phone, password, role";

/// [`UserRepository`] on PostgreSQL.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: Pool<Postgres>,
}

impl PostgresUserRepository {
    /// Create a new [`PostgresUserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn find_by_field(
        &self,
        field: Field,
        value: &str,
    ) -> StorageResult<Option<UserRecord>> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE {field} = $1");

        sqlx::query_as::<_, UserRecord>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)
    }

    async fn exists(&self, field: Field, value: &str) -> StorageResult<bool> {
        let query =
            format!("SELECT EXISTS(SELECT 1 FROM users WHERE {field} = $1)");

        sqlx::query_scalar::<_, bool>(&query)
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(from_sqlx)
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_key(&self, key: &str) -> StorageResult<Option<UserRecord>> {
        self.find_by_field(Field::Email, key).await
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)
    }

    async fn find_by_full_name_and_role(
        &self,
        full_name: &str,
        role: Role,
    ) -> StorageResult<Option<UserRecord>> {
        let query = format!(
            "SELECT {COLUMNS} FROM users WHERE full_name = $1 AND role = $2 LIMIT 1"
        );

        sqlx::query_as::<_, UserRecord>(&query)
            .bind(full_name)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)
    }

    async fn find_all(&self) -> StorageResult<Vec<UserRecord>> {
        let query = format!("SELECT {COLUMNS} FROM users ORDER BY id");

        sqlx::query_as::<_, UserRecord>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(from_sqlx)
    }

    async fn exists_by_email(&self, email: &str) -> StorageResult<bool> {
        self.exists(Field::Email, email).await
    }

    async fn exists_by_phone(&self, phone: &str) -> StorageResult<bool> {
        self.exists(Field::Phone, phone).await
    }

    async fn save(&self, user: UserRecord) -> StorageResult<UserRecord> {
        let query = if user.id == 0 {
            format!(
                r#"INSERT INTO users (full_name, email, phone, password, role)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {COLUMNS}"#
            )
        } else {
            format!(
                r#"UPDATE users
                    SET full_name = $1, email = $2, phone = $3, password = $4, role = $5
                    WHERE id = $6
                    RETURNING {COLUMNS}"#
            )
        };

        let mut statement = sqlx::query_as::<_, UserRecord>(&query)
            .bind(&user.full_name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.password)
            .bind(user.role.as_str());
        if user.id != 0 {
            statement = statement.bind(user.id);
        }

        statement.fetch_one(&self.pool).await.map_err(from_sqlx)
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Email,
    Phone,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Email => write!(f, "email"),
            Field::Phone => write!(f, "phone"),
        }
    }
}

/// Map unique violations to [`StorageError::ConstraintViolation`], using the
/// constraint name to tell which column failed.
fn from_sqlx(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let field = db_err.constraint().and_then(|name| {
                if name.contains("email") {
                    Some(UniqueField::Email)
                } else if name.contains("phone") {
                    Some(UniqueField::Phone)
                } else {
                    None
                }
            });
            return StorageError::ConstraintViolation { field };
        }
    }

    StorageError::backend(err)
}
