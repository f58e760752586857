use super::handlers::{auth, health, portal, verification};
use crate::auth::error::ErrorBody;
use utoipa::{
    OpenApi,
    openapi::{Contact, License},
};

/// Every documented route. Add new handlers here so they show up in the
/// generated spec and the Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::otp::verify_otp,
        auth::otp::resend_otp,
        auth::otp::lead_login,
        auth::otp::lead_verify_otp,
        auth::refresh::refresh,
        auth::logout::logout,
        portal::whoami,
        portal::session,
        verification::request_verification_otp,
        verification::confirm_verification_otp,
    ),
    components(schemas(ErrorBody)),
    tags(
        (name = "health", description = "Liveness and build information"),
        (name = "auth", description = "Login, OTP, token refresh and logout"),
        (name = "portal", description = "Portal-scoped identity and session"),
        (name = "lead", description = "Lead contact verification")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => {
            let name = author[..start].trim();
            let email = author[start + 1..].trim_end_matches('>').trim();
            (
                (!name.is_empty()).then_some(name),
                (!email.is_empty()).then_some(email),
            )
        }
        None => {
            let name = author.trim();
            ((!name.is_empty()).then_some(name), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Lendgate Team"));
            assert_eq!(contact.email.as_deref(), Some("team@lendgate.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "portal"));
        assert!(spec.paths.paths.contains_key("/api/auth_system/login"));
        assert!(spec.paths.paths.contains_key("/api/{portal}/session"));
        assert!(spec.paths.paths.contains_key("/health"));
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Lendgate Team <team@lendgate.dev>"),
            (Some("Lendgate Team"), Some("team@lendgate.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
    }
}
