//! Second-factor lifecycle: setup, enable, login gating, TOTP and backup
//! code verification, disable.

mod common;

use common::{ctx, harness, seed_account};
use gardisto::error::AuthError;
use gardisto::events::AuthEvent;
use gardisto::service::LoginOutcome;
use totp_rs::{Algorithm, Secret, TOTP};

const EMAIL: &str = "admin@example.com";
const PASSWORD: &str = "correct horse battery staple";

fn current_code(secret_base32: &str) -> String {
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap(),
        Some("Gardisto Admin".to_string()),
        EMAIL.to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

#[tokio::test]
async fn setup_returns_plaintext_material_exactly_once() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;

    let setup = harness.service.setup_two_factor(account.id).await.unwrap();
    assert_eq!(setup.backup_codes.len(), 8);
    assert!(setup.provisioning_uri.starts_with("otpauth://totp/"));
    assert!(setup.provisioning_uri.contains(&setup.secret));

    // Only hashes are stored; none of the plaintext codes appear.
    let stored = harness.accounts.get(account.id).await.unwrap();
    assert_eq!(stored.totp_secret.as_deref(), Some(setup.secret.as_str()));
    assert_eq!(stored.backup_code_hashes.len(), 8);
    for code in &setup.backup_codes {
        assert!(!stored.backup_code_hashes.contains(code));
    }
    assert!(!stored.two_factor_enabled);
}

#[tokio::test]
async fn pending_secret_does_not_gate_login() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;
    harness.service.setup_two_factor(account.id).await.unwrap();

    // Enrollment has not been confirmed, so login proceeds directly.
    let outcome = harness
        .service
        .login(EMAIL, PASSWORD, &ctx())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
}

#[tokio::test]
async fn enable_requires_a_valid_code() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;
    let setup = harness.service.setup_two_factor(account.id).await.unwrap();

    let err = harness
        .service
        .enable_two_factor(account.id, "000000", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSecondFactor));
    assert!(!harness.accounts.get(account.id).await.unwrap().two_factor_enabled);

    harness
        .service
        .enable_two_factor(account.id, &current_code(&setup.secret), &ctx())
        .await
        .unwrap();
    assert!(harness.accounts.get(account.id).await.unwrap().two_factor_enabled);

    let entries = harness.audit.entries().await;
    assert!(entries.iter().any(|entry| entry.action == "2FA_ENABLED"));
    assert!(harness
        .events
        .events()
        .iter()
        .any(|event| matches!(event, AuthEvent::TwoFactorEnabled { .. })));
}

#[tokio::test]
async fn enabled_account_requires_second_factor_then_totp_completes() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;
    let setup = harness.service.setup_two_factor(account.id).await.unwrap();
    harness
        .service
        .enable_two_factor(account.id, &current_code(&setup.secret), &ctx())
        .await
        .unwrap();

    let outcome = harness
        .service
        .login(EMAIL, PASSWORD, &ctx())
        .await
        .unwrap();
    let LoginOutcome::Requires2FA { user } = outcome else {
        panic!("expected pending second factor");
    };
    assert_eq!(user.id, account.id);
    // No credentials issued yet.
    assert!(harness.refresh_tokens.records_for(account.id).await.is_empty());

    let (user, tokens) = harness
        .service
        .verify_two_factor(account.id, &current_code(&setup.secret), false, &ctx())
        .await
        .unwrap();
    assert_eq!(user.id, account.id);
    harness.service.verify_access_token(&tokens.access_token).unwrap();

    // Entering the authenticated state performed the full effect set.
    assert_eq!(harness.refresh_tokens.records_for(account.id).await.len(), 1);
    assert_eq!(harness.service.list_sessions(account.id).await.unwrap().len(), 1);
    let entries = harness.audit.entries().await;
    assert!(entries.iter().any(|entry| entry.action == "LOGIN_SUCCESS"));
}

#[tokio::test]
async fn wrong_totp_code_is_rejected_without_touching_lockout() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;
    let setup = harness.service.setup_two_factor(account.id).await.unwrap();
    harness
        .service
        .enable_two_factor(account.id, &current_code(&setup.secret), &ctx())
        .await
        .unwrap();

    let err = harness
        .service
        .verify_two_factor(account.id, "000000", false, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSecondFactor));

    // Second-factor failures stay off the password counter.
    assert_eq!(
        harness.accounts.get(account.id).await.unwrap().failed_login_attempts,
        0
    );
}

#[tokio::test]
async fn backup_codes_are_single_use() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;
    let setup = harness.service.setup_two_factor(account.id).await.unwrap();
    harness
        .service
        .enable_two_factor(account.id, &current_code(&setup.secret), &ctx())
        .await
        .unwrap();

    let code = setup.backup_codes[2].clone();
    harness
        .service
        .verify_two_factor(account.id, &code, true, &ctx())
        .await
        .unwrap();
    assert_eq!(
        harness.accounts.get(account.id).await.unwrap().backup_code_hashes.len(),
        7
    );

    // The same code a second time must fail.
    let err = harness
        .service
        .verify_two_factor(account.id, &code, true, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSecondFactor));

    // A different code from the batch still works.
    harness
        .service
        .verify_two_factor(account.id, &setup.backup_codes[5], true, &ctx())
        .await
        .unwrap();
    assert_eq!(
        harness.accounts.get(account.id).await.unwrap().backup_code_hashes.len(),
        6
    );
}

#[tokio::test]
async fn verify_without_enabled_factor_is_not_configured() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;

    let err = harness
        .service
        .verify_two_factor(account.id, "123456", false, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorNotConfigured));

    // A pending (unconfirmed) secret is not enough either.
    harness.service.setup_two_factor(account.id).await.unwrap();
    let err = harness
        .service
        .verify_two_factor(account.id, "123456", false, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorNotConfigured));
}

#[tokio::test]
async fn disable_clears_secret_codes_and_flag() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;
    let setup = harness.service.setup_two_factor(account.id).await.unwrap();
    harness
        .service
        .enable_two_factor(account.id, &current_code(&setup.secret), &ctx())
        .await
        .unwrap();

    harness
        .service
        .disable_two_factor(account.id, &ctx())
        .await
        .unwrap();

    let stored = harness.accounts.get(account.id).await.unwrap();
    assert!(!stored.two_factor_enabled);
    assert_eq!(stored.totp_secret, None);
    assert!(stored.backup_code_hashes.is_empty());

    let entries = harness.audit.entries().await;
    assert!(entries.iter().any(|entry| entry.action == "2FA_DISABLED"));
    assert!(harness
        .events
        .events()
        .iter()
        .any(|event| matches!(event, AuthEvent::TwoFactorDisabled { .. })));

    // Login no longer requires a second factor.
    let outcome = harness
        .service
        .login(EMAIL, PASSWORD, &ctx())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
}

#[tokio::test]
async fn setup_refuses_while_enabled() {
    let harness = harness();
    let account = seed_account(&harness, EMAIL, PASSWORD).await;
    let setup = harness.service.setup_two_factor(account.id).await.unwrap();
    harness
        .service
        .enable_two_factor(account.id, &current_code(&setup.secret), &ctx())
        .await
        .unwrap();

    let err = harness.service.setup_two_factor(account.id).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
}
