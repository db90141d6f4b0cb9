//! Stage 4: fix and test
//!
//! Applies the category's remedy to a copy of the original request and
//! sends the copy live. Categories without an automated remedy, and
//! requests the remedy cannot change, produce no proposal.

use serde_json::Value;
use tracing::info;

use super::investigate::{request_coupons, request_items};
use super::replay::{evaluate_response, send_order_request};
use super::{ErrorCategory, FixProposal, ItemKind, OrderLogRow, ProblematicItem};
use crate::core::HttpTransport;

/// A mutated request and what was changed
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub description: String,
    pub changes: Vec<String>,
    pub request: Value,
}

fn substitute_items(body: &mut Value, problems: &[&ProblematicItem]) -> Vec<String> {
    let mut changes = Vec::new();
    let Some(items) = body.get_mut("items").and_then(Value::as_array_mut) else {
        return changes;
    };

    for item in items.iter_mut() {
        let Some(code) = item.get("code").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        let replacement = problems
            .iter()
            .find(|p| p.code == code)
            .and_then(|p| p.alternatives.first());
        if let (Some(replacement), Some(fields)) = (replacement, item.as_object_mut()) {
            fields.insert("code".to_string(), Value::String(replacement.clone()));
            changes.push(format!("replaced item {} with {}", code, replacement));
        }
    }
    changes
}

fn remove_coupons(body: &mut Value, problems: &[&ProblematicItem]) -> Vec<String> {
    let bad: Vec<&str> = problems.iter().map(|p| p.code.as_str()).collect();
    let mut changes = Vec::new();
    let Some(fields) = body.as_object_mut() else {
        return changes;
    };

    if let Some(Value::Array(coupons)) = fields.get_mut("coupons") {
        coupons.retain(|c| {
            let code = c.as_str().or_else(|| c.get("code").and_then(Value::as_str)).unwrap_or_default();
            let invalid = bad.iter().any(|b| b.eq_ignore_ascii_case(code));
            if invalid {
                changes.push(format!("removed discount code {}", code));
            }
            !invalid
        });
    }

    let coupon_code = fields.get("couponCode").and_then(Value::as_str).map(str::to_string);
    if let Some(code) = coupon_code {
        if bad.iter().any(|b| b.eq_ignore_ascii_case(&code)) {
            fields.remove("couponCode");
            changes.push(format!("removed discount code {}", code));
        }
    }
    changes
}

fn switch_service_method(body: &mut Value, problems: &[&ProblematicItem]) -> Vec<String> {
    let Some(problem) = problems.first() else {
        return Vec::new();
    };
    let Some(replacement) = problem.alternatives.iter().find(|m| !m.eq_ignore_ascii_case(&problem.code)) else {
        return Vec::new();
    };
    match body.as_object_mut() {
        Some(fields) => {
            fields.insert("serviceMethod".to_string(), Value::String(replacement.clone()));
            vec![format!("switched service method from {} to {}", problem.code, replacement)]
        }
        None => Vec::new(),
    }
}

/// Remedy for a category, applied to a copy of `body`
///
/// `None` when the category has no remedy or nothing in the body changed.
pub fn propose_mutation(category: ErrorCategory, body: &Value, problematic: &[ProblematicItem]) -> Option<Mutation> {
    let of_kind = |kind: ItemKind| problematic.iter().filter(|p| p.kind == kind).collect::<Vec<_>>();
    let mut request = body.clone();

    let (description, changes) = match category {
        ErrorCategory::InvalidItem => {
            if request_items(body).is_empty() {
                return None;
            }
            ("substitute unavailable items", substitute_items(&mut request, &of_kind(ItemKind::MenuItem)))
        }
        ErrorCategory::InvalidDiscountCode => {
            if request_coupons(body).is_empty() {
                return None;
            }
            ("remove invalid discount codes", remove_coupons(&mut request, &of_kind(ItemKind::DiscountCode)))
        }
        ErrorCategory::UnsupportedFulfillmentMethod => (
            "switch to a supported service method",
            switch_service_method(&mut request, &of_kind(ItemKind::FulfillmentMethod)),
        ),
        _ => return None,
    };

    if changes.is_empty() {
        return None;
    }
    Some(Mutation {
        description: description.to_string(),
        changes,
        request,
    })
}

/// Propose a fix and test it against the live service
pub async fn fix_and_test(
    transport: &dyn HttpTransport,
    row: &OrderLogRow,
    base_url: &str,
    category: ErrorCategory,
    problematic: &[ProblematicItem],
) -> Option<FixProposal> {
    if !category.has_automated_fix() {
        return None;
    }
    let mutation = propose_mutation(category, &row.request_body, problematic)?;

    let (tested, resolved, status_code, error) =
        match send_order_request(transport, row, base_url, &mutation.request).await {
            Ok(response) => {
                let (_, error) = evaluate_response(&response);
                (true, error.is_none(), Some(response.status), error)
            }
            Err(e) => (true, false, None, Some(e.to_string())),
        };

    info!(
        log_id = %row.id,
        category = %category,
        resolved,
        "tested proposed fix"
    );

    Some(FixProposal {
        description: mutation.description,
        changes: mutation.changes,
        modified_request: mutation.request,
        tested,
        resolved,
        status_code,
        error,
    })
}
