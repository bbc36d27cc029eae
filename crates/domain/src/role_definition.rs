//! Role-definition identifier canonicalization.
//!
//! ARM accepts role-definition ids either scoped under a subscription
//! (`/subscriptions/{sub}/providers/Microsoft.Authorization/roleDefinitions/{guid}`)
//! or at tenant root (`/providers/Microsoft.Authorization/roleDefinitions/{guid}`).
//! Comparisons and persisted state always use the tenant-root form.

/// Number of `/`-delimited segments in a subscription-scoped role-definition id.
pub const SUBSCRIPTION_SCOPED_SEGMENT_COUNT: usize = 7;

const SUBSCRIPTION_PREFIX_SEGMENT_COUNT: usize = 3;

/// Returns the tenant-root form of a role-definition id.
///
/// Ids that are not subscription scoped, including malformed ones, are
/// returned unchanged.
#[must_use]
pub fn normalize_role_definition_id(value: &str) -> String {
    let segments: Vec<&str> = value.split('/').collect();
    if segments.len() != SUBSCRIPTION_SCOPED_SEGMENT_COUNT {
        return value.to_owned();
    }

    format!(
        "/{}",
        segments[SUBSCRIPTION_PREFIX_SEGMENT_COUNT..].join("/")
    )
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::normalize_role_definition_id;

    const SCOPED: &str = "/subscriptions/00000000-0000-0000-0000-000000000001/providers/Microsoft.Authorization/roleDefinitions/b24988ac-6180-42a0-ab88-20f7382dd24c";
    const TENANT_ROOT: &str =
        "/providers/Microsoft.Authorization/roleDefinitions/b24988ac-6180-42a0-ab88-20f7382dd24c";

    #[test]
    fn subscription_scoped_id_is_reduced_to_tenant_root() {
        assert_eq!(normalize_role_definition_id(SCOPED), TENANT_ROOT);
    }

    #[test]
    fn tenant_root_id_is_a_fixed_point() {
        assert_eq!(normalize_role_definition_id(TENANT_ROOT), TENANT_ROOT);
    }

    #[test]
    fn malformed_ids_pass_through() {
        for value in ["", "role1", "/", "a/b/c/d/e/f/g/h", "not-a-role-id"] {
            assert_eq!(normalize_role_definition_id(value), value);
        }
    }

    #[test]
    fn any_seven_segment_value_drops_first_three_segments() {
        assert_eq!(normalize_role_definition_id("a/b/c/d/e/f/g"), "/d/e/f/g");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(value in "[a-zA-Z0-9/.-]{0,80}") {
            let once = normalize_role_definition_id(&value);
            let twice = normalize_role_definition_id(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
