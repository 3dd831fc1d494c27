use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::{
    error::AppError,
    models::user::{NewUser, User, UserChanges},
};

/// Persistence gateway for user records. Handlers only ever see this trait.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_by_npm(&self, npm: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// First record other than `excluding` that already holds `npm` or `email`.
    async fn find_conflict(
        &self,
        npm: Option<&str>,
        email: Option<&str>,
        excluding: Option<i64>,
    ) -> Result<Option<User>, AppError>;

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, AppError>;

    async fn delete(&self, id: i64) -> Result<bool, AppError>;

    /// Case-insensitive substring match over full name, npm and email.
    async fn list(&self, search: Option<&str>) -> Result<Vec<User>, AppError>;
}

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// SQLite's `lower()` and `LIKE` only fold ASCII, so matching happens here
/// with full Unicode lowercasing on both sides.
fn matches_search(user: &User, needle: &str) -> bool {
    [&user.full_name, &user.npm, &user.email]
        .into_iter()
        .any(|value| value.to_lowercase().contains(needle))
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(
            "INSERT INTO users (npm, email, full_name, kelas, jurusan, lokasi_kampus, tempat_lahir, \
             tanggal_lahir, jenis_kelamin, alamat, no_hp, ipk, role, password_hash, \
             cv, krs, pas_foto, ktm, ktp, rangkuman_nilai, certificate) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING *",
        )
        .bind(&user.npm)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.kelas)
        .bind(&user.jurusan)
        .bind(&user.lokasi_kampus)
        .bind(&user.tempat_lahir)
        .bind(user.tanggal_lahir)
        .bind(&user.jenis_kelamin)
        .bind(&user.alamat)
        .bind(&user.no_hp)
        .bind(&user.ipk)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(&user.documents.cv)
        .bind(&user.documents.krs)
        .bind(&user.documents.pas_foto)
        .bind(&user.documents.ktm)
        .bind(&user.documents.ktp)
        .bind(&user.documents.rangkuman_nilai)
        .bind(&user.documents.certificate)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_npm(&self, npm: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE npm = ?")
            .bind(npm)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_conflict(
        &self,
        npm: Option<&str>,
        email: Option<&str>,
        excluding: Option<i64>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE (npm = ? OR email = ?) AND id IS NOT ? \
             ORDER BY CASE WHEN npm = ? THEN 0 ELSE 1 END LIMIT 1",
        )
        .bind(npm)
        .bind(email)
        .bind(excluding)
        .bind(npm)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, AppError> {
        let updated = sqlx::query_as::<_, User>(
            "UPDATE users SET \
             npm = COALESCE(?, npm), \
             email = COALESCE(?, email), \
             full_name = COALESCE(?, full_name), \
             kelas = COALESCE(?, kelas), \
             jurusan = COALESCE(?, jurusan), \
             lokasi_kampus = COALESCE(?, lokasi_kampus), \
             tempat_lahir = COALESCE(?, tempat_lahir), \
             tanggal_lahir = COALESCE(?, tanggal_lahir), \
             jenis_kelamin = COALESCE(?, jenis_kelamin), \
             alamat = COALESCE(?, alamat), \
             no_hp = COALESCE(?, no_hp), \
             ipk = COALESCE(?, ipk), \
             role = COALESCE(?, role), \
             password_hash = COALESCE(?, password_hash), \
             cv = ?, krs = ?, pas_foto = ?, ktm = ?, ktp = ?, rangkuman_nilai = ?, certificate = ?, \
             updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? RETURNING *",
        )
        .bind(changes.npm)
        .bind(changes.email)
        .bind(changes.full_name)
        .bind(changes.kelas)
        .bind(changes.jurusan)
        .bind(changes.lokasi_kampus)
        .bind(changes.tempat_lahir)
        .bind(changes.tanggal_lahir)
        .bind(changes.jenis_kelamin)
        .bind(changes.alamat)
        .bind(changes.no_hp)
        .bind(changes.ipk)
        .bind(changes.role.map(|r| r.as_str()))
        .bind(changes.password_hash)
        .bind(changes.documents.cv)
        .bind(changes.documents.krs)
        .bind(changes.documents.pas_foto)
        .bind(changes.documents.ktm)
        .bind(changes.documents.ktp)
        .bind(changes.documents.rangkuman_nilai)
        .bind(changes.documents.certificate)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let users = match search {
            Some(term) => {
                let needle = term.to_lowercase();
                users
                    .into_iter()
                    .filter(|user| matches_search(user, &needle))
                    .collect()
            }
            None => users,
        };
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{models::user::Role, uploads::DocumentRefs};

    fn user(full_name: &str, npm: &str, email: &str) -> User {
        User {
            id: 1,
            npm: npm.to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            kelas: "4IA01".to_string(),
            jurusan: "Informatika".to_string(),
            lokasi_kampus: "Depok".to_string(),
            tempat_lahir: "Jakarta".to_string(),
            tanggal_lahir: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            jenis_kelamin: "P".to_string(),
            alamat: "Jl. Akses UI".to_string(),
            no_hp: "0811111111".to_string(),
            ipk: "3.50".to_string(),
            role: Role::User,
            password_hash: String::new(),
            documents: DocumentRefs::default(),
            created_at: Default::default(),
            updated_at: Default::default(),
        }
    }

    #[test]
    fn search_folds_case_beyond_ascii() {
        let elise = user("ÉLISE Ünal", "12345", "elise@kampus.ac.id");
        assert!(matches_search(&elise, "élise"));
        assert!(matches_search(&elise, "ünal"));
        assert!(matches_search(&elise, "kampus"));
        assert!(!matches_search(&elise, "budi"));
    }

    #[test]
    fn wildcards_are_literal() {
        let budi = user("Budi", "50", "budi@b.com");
        assert!(!matches_search(&budi, "%"));
        assert!(!matches_search(&budi, "_"));
    }
}
