//! Human-readable resolution checklist

use super::{ErrorCategory, FixProposal, ItemKind, ProblematicItem};

/// Ordered steps derived from the pipeline state
pub fn resolution_steps(
    category: ErrorCategory,
    problematic: &[ProblematicItem],
    fix: Option<&FixProposal>,
) -> Vec<String> {
    let mut steps = Vec::new();

    for item in problematic {
        let step = match (item.kind, item.alternatives.is_empty()) {
            (ItemKind::MenuItem, false) => format!(
                "Replace item {} with one of: {}",
                item.code,
                item.alternatives.join(", ")
            ),
            (ItemKind::MenuItem, true) => format!("Remove item {} from the order", item.code),
            (ItemKind::DiscountCode, _) => format!("Remove discount code {} and retry", item.code),
            (ItemKind::FulfillmentMethod, false) => format!(
                "Switch service method {} to one of: {}",
                item.code,
                item.alternatives.join(", ")
            ),
            (ItemKind::FulfillmentMethod, true) => {
                format!("Store offers no alternative to service method {}", item.code)
            }
        };
        steps.push(step);
    }

    match fix {
        Some(fix) if fix.resolved => steps.push(format!("Verified fix: {}", fix.changes.join("; "))),
        Some(fix) => steps.push(format!(
            "Proposed fix ({}) did not resolve the failure: {}",
            fix.description,
            fix.error.as_deref().unwrap_or("unknown error")
        )),
        None => {}
    }

    let category_steps: &[&str] = match category {
        ErrorCategory::InvalidItem => &["Sync the agent's menu catalog with the store menu"],
        ErrorCategory::InvalidDiscountCode => &["Stop offering expired or inactive discount codes to customers"],
        ErrorCategory::UnsupportedFulfillmentMethod => {
            &["Check the store profile's service methods before offering a fulfillment option"]
        }
        ErrorCategory::StoreUnavailable => &[
            "Confirm store hours and online status",
            "Tell the customer the store is not taking orders and offer another store",
        ],
        ErrorCategory::Timeout => &[
            "Retry the order once the ordering service responds",
            "Check ordering service latency for the time of the failure",
        ],
        ErrorCategory::InternalDefect => &[
            "Escalate to engineering with the error stack",
            "Do not retry until the defect is fixed",
        ],
        ErrorCategory::InputValidation => &["Compare the request body against the ordering API contract"],
        ErrorCategory::AddressError => &["Re-confirm the delivery address with the customer"],
        ErrorCategory::Other => &["Review the log row manually"],
    };
    steps.extend(category_steps.iter().map(|s| s.to_string()));
    steps
}
