//! Bootstrap data: the groups and permissions every deployment needs, and an
//! optional demo directory for local use and tests.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::error::AppResult;
use crate::identity::{ADMIN_GROUP, BASELINE_GROUP, STAFF_GROUP};
use crate::security::hash_password;
use crate::storage::{NewAddress, NewUser, Store};

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

pub const JOE_USERNAME: &str = "Joe Bloggs";
pub const JOE_PASSWORD: &str = "joe-bloggs-pw";
pub const JANE_USERNAME: &str = "Jane Doe";
pub const JANE_PASSWORD: &str = "jane-doe-pw";
pub const DEMO_ADMIN_USERNAME: &str = "Admin User";
pub const DEMO_ADMIN_PASSWORD: &str = "admin-user-pw";
/// Inert account kept for parity with directories that reserve one.
pub const ANONYMOUS_USERNAME: &str = "AnonymousUser";

/// Content types whose add/change/delete permissions always exist.
const CORE_CONTENT_TYPES: [(&str, &str); 4] =
    [("auth", "user"), ("auth", "group"), ("auth", "permission"), ("contenttypes", "contenttype")];

fn register_default_permissions(store: &mut Store, app_label: &str, model: &str) -> AppResult<()> {
    let ct = store.ensure_content_type(app_label, model);
    for verb in ["add", "change", "delete"] {
        store.ensure_permission(ct, &format!("{verb}_{model}"), &format!("Can {verb} {model}"))?;
    }
    Ok(())
}

/// Idempotently create the baseline groups, core permissions and, when no
/// admin exists, an admin account with `admin_password`.
pub fn ensure_baseline(store: &mut Store, admin_password: &str) -> AppResult<()> {
    let baseline = store.ensure_group(BASELINE_GROUP)?;
    store.ensure_group(STAFF_GROUP)?;
    let admin = store.ensure_group(ADMIN_GROUP)?;
    for (app, model) in CORE_CONTENT_TYPES {
        register_default_permissions(store, app, model)?;
    }

    if store.members_of(ADMIN_GROUP).iter().any(|u| u.is_active) {
        return Ok(());
    }
    if store.user_by_username(DEFAULT_ADMIN_USERNAME).is_some() {
        warn!(target: "lims::fixtures", "no active admin, and '{}' exists without admin rights", DEFAULT_ADMIN_USERNAME);
        return Ok(());
    }
    let phc = hash_password(admin_password, &store.hashing())?;
    store.create_user(NewUser {
        username: DEFAULT_ADMIN_USERNAME.to_string(),
        password_hash: Some(phc),
        is_active: true,
        groups: [baseline, admin].into_iter().collect(),
        ..Default::default()
    })?;
    info!(target: "lims::fixtures", "created default admin account '{}'", DEFAULT_ADMIN_USERNAME);
    Ok(())
}

/// Load the demo directory. Skipped when Joe Bloggs already exists.
pub fn seed_demo(store: &mut Store) -> AppResult<()> {
    if store.user_by_username(JOE_USERNAME).is_some() {
        return Ok(());
    }
    let hashing = store.hashing();
    let joe_group = store.ensure_group("joe_group")?;
    let jane_group = store.ensure_group("jane_group")?;
    let baseline = store.ensure_group(BASELINE_GROUP)?;
    let staff = store.ensure_group(STAFF_GROUP)?;
    let admin = store.ensure_group(ADMIN_GROUP)?;

    store.create_user(NewUser {
        username: JOE_USERNAME.to_string(),
        email: "joe@tgac.com".to_string(),
        first_name: "Joe".to_string(),
        last_name: "Bloggs".to_string(),
        password_hash: Some(hash_password(JOE_PASSWORD, &hashing)?),
        is_active: true,
        groups: [joe_group].into_iter().collect(),
        addresses: vec![NewAddress {
            institution_name: "Beetroot Institute".to_string(),
            address_1: "12 Muddy Field".to_string(),
            address_2: "Long Lane".to_string(),
            city: "Norwich".to_string(),
            postcode: "NR1 1AA".to_string(),
            country: "UK".to_string(),
        }],
    })?;
    store.create_user(NewUser {
        username: JANE_USERNAME.to_string(),
        email: "jane@tgac.com".to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        password_hash: Some(hash_password(JANE_PASSWORD, &hashing)?),
        is_active: true,
        groups: [jane_group, staff].into_iter().collect(),
        ..Default::default()
    })?;
    store.create_user(NewUser {
        username: DEMO_ADMIN_USERNAME.to_string(),
        email: "admin@tgac.com".to_string(),
        password_hash: Some(hash_password(DEMO_ADMIN_PASSWORD, &hashing)?),
        is_active: true,
        groups: [baseline, admin].into_iter().collect(),
        ..Default::default()
    })?;
    if store.user_by_username(ANONYMOUS_USERNAME).is_none() {
        store.create_user(NewUser { username: ANONYMOUS_USERNAME.to_string(), is_active: false, groups: BTreeSet::new(), ..Default::default() })?;
    }

    let equipment = store.ensure_content_type("equipment", "equipment");
    store.ensure_permission(equipment, "change_equipment", "Can change equipment")?;
    info!(target: "lims::fixtures", users = store.user_count(), "demo directory loaded");
    Ok(())
}
