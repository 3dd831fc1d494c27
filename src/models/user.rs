use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    error::AppError,
    uploads::{DocumentRefs, FormFields},
    validation::{parse_birth_date, validate_birth_date, validate_registration_role, validate_role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Asisten,
    Programmer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Asisten => "asisten",
            Role::Programmer => "programmer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "asisten" => Ok(Role::Asisten),
            "programmer" => Ok(Role::Programmer),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A stored user. The password hash never leaves the process.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub npm: String,
    pub email: String,
    pub full_name: String,
    pub kelas: String,
    pub jurusan: String,
    pub lokasi_kampus: String,
    pub tempat_lahir: String,
    pub tanggal_lahir: NaiveDate,
    pub jenis_kelamin: String,
    pub alamat: String,
    #[serde(rename = "noHP")]
    pub no_hp: String,
    pub ipk: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub documents: DocumentRefs,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// What the profile endpoint exposes about the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub full_name: String,
    pub npm: String,
    pub jurusan: String,
    pub lokasi_kampus: String,
    pub tempat_lahir: String,
    pub tanggal_lahir: NaiveDate,
    pub jenis_kelamin: String,
    pub alamat: String,
    #[serde(rename = "noHP")]
    pub no_hp: String,
    pub email: String,
    pub role: Role,
    #[serde(flatten)]
    pub documents: DocumentRefs,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            npm: user.npm,
            jurusan: user.jurusan,
            lokasi_kampus: user.lokasi_kampus,
            tempat_lahir: user.tempat_lahir,
            tanggal_lahir: user.tanggal_lahir,
            jenis_kelamin: user.jenis_kelamin,
            alamat: user.alamat,
            no_hp: user.no_hp,
            email: user.email,
            role: user.role,
            documents: user.documents,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Everything needed to insert a row; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub npm: String,
    pub email: String,
    pub full_name: String,
    pub kelas: String,
    pub jurusan: String,
    pub lokasi_kampus: String,
    pub tempat_lahir: String,
    pub tanggal_lahir: NaiveDate,
    pub jenis_kelamin: String,
    pub alamat: String,
    pub no_hp: String,
    pub ipk: String,
    pub role: Role,
    pub password_hash: String,
    pub documents: DocumentRefs,
}

/// Partial update. `None` keeps the stored value; documents are always
/// written as resolved against the previous record.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub npm: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub kelas: Option<String>,
    pub jurusan: Option<String>,
    pub lokasi_kampus: Option<String>,
    pub tempat_lahir: Option<String>,
    pub tanggal_lahir: Option<NaiveDate>,
    pub jenis_kelamin: Option<String>,
    pub alamat: Option<String>,
    pub no_hp: Option<String>,
    pub ipk: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
    pub documents: DocumentRefs,
}

/// Registration form as received. [`RegisterForm::check`] runs before
/// anything touches the store.
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub full_name: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub npm: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub kelas: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub jurusan: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub lokasi_kampus: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub tempat_lahir: Option<String>,
    #[validate(required(message = "is required"), custom(function = "validate_birth_date"))]
    pub tanggal_lahir: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub jenis_kelamin: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub alamat: Option<String>,
    #[serde(rename = "noHP")]
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub no_hp: Option<String>,
    #[validate(required(message = "is required"), email(message = "must be a valid email"))]
    pub email: Option<String>,
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub ipk: Option<String>,
    #[validate(required(message = "is required"), custom(function = "validate_registration_role"))]
    pub role: Option<String>,
    #[serde(skip)]
    #[validate(required(message = "is required"), length(min = 1, message = "must not be empty"))]
    pub password: Option<String>,
    #[serde(skip)]
    #[validate(required(message = "is required"))]
    pub confirm_password: Option<String>,
}

impl RegisterForm {
    pub fn from_fields(fields: &mut FormFields) -> Self {
        Self {
            full_name: fields.remove("fullName"),
            npm: fields.remove("npm"),
            kelas: fields.remove("kelas"),
            jurusan: fields.remove("jurusan"),
            lokasi_kampus: fields.remove("lokasiKampus"),
            tempat_lahir: fields.remove("tempatLahir"),
            tanggal_lahir: fields.remove("tanggalLahir"),
            jenis_kelamin: fields.remove("jenisKelamin"),
            alamat: fields.remove("alamat"),
            no_hp: fields.remove("noHP"),
            email: fields.remove("email"),
            ipk: fields.remove("ipk"),
            role: fields.remove("role"),
            password: fields.remove("password"),
            confirm_password: fields.remove("confirmPassword"),
        }
    }

    /// Field rules plus the password confirmation, reported together.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if self.confirm_password.is_some() && self.confirm_password != self.password {
            let mut mismatch = ValidationError::new("must_match");
            mismatch.message = Some("Password not match".into());
            errors.add("confirm_password", mismatch);
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Converts a form that already passed [`RegisterForm::check`].
    pub fn into_new_user(
        self,
        password_hash: String,
        documents: DocumentRefs,
    ) -> Result<NewUser, AppError> {
        let tanggal_lahir = self
            .tanggal_lahir
            .as_deref()
            .and_then(parse_birth_date)
            .ok_or_else(|| AppError::invalid_field("tanggalLahir", "must be a valid date"))?;
        let role = self
            .role
            .as_deref()
            .unwrap_or_default()
            .parse::<Role>()
            .map_err(|_| AppError::invalid_field("role", "must be a known role"))?;

        Ok(NewUser {
            npm: self.npm.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            full_name: self.full_name.unwrap_or_default(),
            kelas: self.kelas.unwrap_or_default(),
            jurusan: self.jurusan.unwrap_or_default(),
            lokasi_kampus: self.lokasi_kampus.unwrap_or_default(),
            tempat_lahir: self.tempat_lahir.unwrap_or_default(),
            tanggal_lahir,
            jenis_kelamin: self.jenis_kelamin.unwrap_or_default(),
            alamat: self.alamat.unwrap_or_default(),
            no_hp: self.no_hp.unwrap_or_default(),
            ipk: self.ipk.unwrap_or_default(),
            role,
            password_hash,
            documents,
        })
    }
}

/// Update form: every field optional, no confirmation.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateForm {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub npm: Option<String>,
    pub kelas: Option<String>,
    pub jurusan: Option<String>,
    pub lokasi_kampus: Option<String>,
    pub tempat_lahir: Option<String>,
    #[validate(custom(function = "validate_birth_date"))]
    pub tanggal_lahir: Option<String>,
    pub jenis_kelamin: Option<String>,
    pub alamat: Option<String>,
    pub no_hp: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    pub ipk: Option<String>,
    #[validate(custom(function = "validate_role"))]
    pub role: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub password: Option<String>,
}

impl UpdateForm {
    pub fn from_fields(fields: &mut FormFields) -> Self {
        Self {
            full_name: fields.remove("fullName"),
            npm: fields.remove("npm"),
            kelas: fields.remove("kelas"),
            jurusan: fields.remove("jurusan"),
            lokasi_kampus: fields.remove("lokasiKampus"),
            tempat_lahir: fields.remove("tempatLahir"),
            tanggal_lahir: fields.remove("tanggalLahir"),
            jenis_kelamin: fields.remove("jenisKelamin"),
            alamat: fields.remove("alamat"),
            no_hp: fields.remove("noHP"),
            email: fields.remove("email"),
            ipk: fields.remove("ipk"),
            role: fields.remove("role"),
            password: fields.remove("password"),
        }
    }

    pub fn requested_role(&self) -> Result<Option<Role>, AppError> {
        self.role
            .as_deref()
            .map(|r| {
                r.parse::<Role>()
                    .map_err(|_| AppError::invalid_field("role", "must be a known role"))
            })
            .transpose()
    }

    pub fn into_changes(
        self,
        password_hash: Option<String>,
        documents: DocumentRefs,
    ) -> Result<UserChanges, AppError> {
        let role = self.requested_role()?;
        let tanggal_lahir = match self.tanggal_lahir.as_deref() {
            Some(raw) => Some(
                parse_birth_date(raw)
                    .ok_or_else(|| AppError::invalid_field("tanggalLahir", "must be a valid date"))?,
            ),
            None => None,
        };

        Ok(UserChanges {
            npm: self.npm,
            email: self.email,
            full_name: self.full_name,
            kelas: self.kelas,
            jurusan: self.jurusan,
            lokasi_kampus: self.lokasi_kampus,
            tempat_lahir: self.tempat_lahir,
            tanggal_lahir,
            jenis_kelamin: self.jenis_kelamin,
            alamat: self.alamat,
            no_hp: self.no_hp,
            ipk: self.ipk,
            role,
            password_hash,
            documents,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub data: LoginData,
    pub token: String,
}

/// Signed session claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_fields() -> FormFields {
        [
            ("fullName", "Budi Santoso"),
            ("npm", "50421234"),
            ("kelas", "3IA01"),
            ("jurusan", "Informatika"),
            ("lokasiKampus", "Depok"),
            ("tempatLahir", "Bogor"),
            ("tanggalLahir", "2002-08-17"),
            ("jenisKelamin", "L"),
            ("alamat", "Jl. Margonda 100"),
            ("noHP", "08123456789"),
            ("email", "budi@student.ac.id"),
            ("ipk", "3.75"),
            ("role", "user"),
            ("password", "rahasia"),
            ("confirmPassword", "rahasia"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn complete_registration_is_valid() {
        let form = RegisterForm::from_fields(&mut complete_fields());
        assert!(form.check().is_ok());

        let user = form
            .into_new_user("hash".into(), DocumentRefs::default())
            .unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.tanggal_lahir, NaiveDate::from_ymd_opt(2002, 8, 17).unwrap());
    }

    #[test]
    fn registration_reports_every_violation() {
        let mut fields = complete_fields();
        fields.remove("fullName");
        fields.insert("email".into(), "not-an-email".into());
        fields.insert("confirmPassword".into(), "different".into());
        fields.insert("role".into(), "admin".into());

        let err = RegisterForm::from_fields(&mut fields).check().unwrap_err();
        let reported: Vec<String> = crate::validation::field_errors(&err)
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert!(reported.contains(&"fullName".to_string()));
        assert!(reported.contains(&"email".to_string()));
        assert!(reported.contains(&"confirmPassword".to_string()));
        assert!(reported.contains(&"role".to_string()));
    }

    #[test]
    fn payload_echo_omits_passwords() {
        let form = RegisterForm::from_fields(&mut complete_fields());
        let echo = serde_json::to_value(&form).unwrap();
        assert_eq!(echo["npm"], "50421234");
        assert_eq!(echo["noHP"], "08123456789");
        assert!(echo.get("password").is_none());
        assert!(echo.get("confirmPassword").is_none());
    }

    #[test]
    fn empty_update_is_valid() {
        let form = UpdateForm::default();
        assert!(form.validate().is_ok());
        let changes = form.into_changes(None, DocumentRefs::default()).unwrap();
        assert!(changes.npm.is_none());
        assert!(changes.role.is_none());
    }

    #[test]
    fn update_rejects_bad_email_and_role() {
        let form = UpdateForm {
            email: Some("nope".into()),
            role: Some("superuser".into()),
            ..Default::default()
        };
        assert!(form.validate().is_err());
    }
}
