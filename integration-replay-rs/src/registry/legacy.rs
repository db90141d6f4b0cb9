//! Action table for GUID-keyed legacy tenants
//!
//! The legacy practice system sits behind a JSON gateway. Every call is a
//! POST to a named operation with GUID identifiers and a `uui` correlation
//! field.

use serde_json::{Map, Value};

use super::{
    always_valid, copy, missing_booking_fields_payload, missing_fields, param_u64, put, require,
    ActionConfig, BuildContext, Endpoint, Validation,
};
use crate::core::HttpMethod;
use crate::error::Result;
use crate::normalize::{first_param, param_str, Params};

pub const PATIENT_ACTIONS: &[ActionConfig] = &[
    ActionConfig {
        name: "lookup",
        endpoint: Endpoint::Static("getPatientByFilter"),
        method: HttpMethod::Post,
        build_body: build_lookup,
        validate: validate_lookup,
        success_label: "Patient search completed",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "get",
        endpoint: Endpoint::Static("getPatient"),
        method: HttpMethod::Post,
        build_body: build_patient_ref,
        validate: validate_patient_ref,
        success_label: "Patient record retrieved",
        search: false,
        cacheable: true,
    },
    ActionConfig {
        name: "create",
        endpoint: Endpoint::Static("createPatient"),
        method: HttpMethod::Post,
        build_body: build_create,
        validate: validate_create,
        success_label: "Patient created",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "appointments",
        endpoint: Endpoint::Static("getPatientAppts"),
        method: HttpMethod::Post,
        build_body: build_patient_ref,
        validate: validate_patient_ref,
        success_label: "Patient appointments retrieved",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "clinic_info",
        endpoint: Endpoint::Static("getLocation"),
        method: HttpMethod::Post,
        build_body: build_clinic_info,
        validate: always_valid,
        success_label: "Clinic information retrieved",
        search: false,
        cacheable: true,
    },
];

pub const SCHEDULING_ACTIONS: &[ActionConfig] = &[
    ActionConfig {
        name: "slots",
        endpoint: Endpoint::Static("getApptSlots"),
        method: HttpMethod::Post,
        build_body: build_slots,
        validate: always_valid,
        success_label: "Available slots found",
        search: true,
        cacheable: false,
    },
    ActionConfig {
        name: "grouped_slots",
        endpoint: Endpoint::Static("getGroupedApptSlots"),
        method: HttpMethod::Post,
        build_body: build_grouped_slots,
        validate: validate_grouped_slots,
        success_label: "Grouped sibling slots found",
        search: true,
        cacheable: false,
    },
    ActionConfig {
        name: "book_child",
        endpoint: Endpoint::Static("createAppt"),
        method: HttpMethod::Post,
        build_body: build_book,
        validate: validate_book,
        success_label: "Appointment booked",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "cancel",
        endpoint: Endpoint::Static("cancelAppt"),
        method: HttpMethod::Post,
        build_body: build_cancel,
        validate: validate_cancel,
        success_label: "Appointment cancelled",
        search: false,
        cacheable: false,
    },
];

fn base_body(ctx: &BuildContext<'_>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("uui".to_string(), Value::String(ctx.correlation_token.to_string()));
    body
}

fn validate_lookup(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(
        params,
        &["phoneNumber", "patientName", "filter", "birthdayDateTime"],
        "search criteria",
        "lookup",
    )?;
    Ok(Validation::Valid)
}

fn build_lookup(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    let filter = first_param(params, &["filter", "phoneNumber", "patientName"]);
    put(&mut body, "filter", filter);
    copy(&mut body, params, "birthdayDateTime", "birthdayDateTime");
    put(
        &mut body,
        "locationGUID",
        ctx.param_or_default(params, "locationGUID", &ctx.tenant.default_location_id),
    );
    Value::Object(body)
}

fn validate_patient_ref(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(params, &["patientGUID", "patientGuid"], "patient identifier", "get/appointments")?;
    Ok(Validation::Valid)
}

fn build_patient_ref(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    put(&mut body, "patientGUID", first_param(params, &["patientGUID", "patientGuid"]));
    Value::Object(body)
}

fn validate_create(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(params, &["patientFirstName"], "patient first name", "create")?;
    require(params, &["patientLastName"], "patient last name", "create")?;
    require(params, &["phoneNumber"], "patient phone number", "create")?;
    Ok(Validation::Valid)
}

fn build_create(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    copy(&mut body, params, "patientFirstName", "patientFirstName");
    copy(&mut body, params, "patientLastName", "patientLastName");
    copy(&mut body, params, "phoneNumber", "phoneNumber");
    copy(&mut body, params, "birthdayDateTime", "birthdayDateTime");
    copy(&mut body, params, "gender", "gender");
    copy(&mut body, params, "emailAddress", "emailAddress");
    put(
        &mut body,
        "providerGUID",
        ctx.param_or_default(params, "providerGUID", &ctx.tenant.default_provider_id),
    );
    put(
        &mut body,
        "locationGUID",
        ctx.param_or_default(params, "locationGUID", &ctx.tenant.default_location_id),
    );
    Value::Object(body)
}

fn build_clinic_info(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    put(
        &mut body,
        "locationGUID",
        ctx.param_or_default(params, "locationGUID", &ctx.tenant.default_location_id),
    );
    Value::Object(body)
}

fn build_slots(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    copy(&mut body, params, "startDate", "startDate");
    copy(&mut body, params, "endDate", "endDate");
    copy(&mut body, params, "scheduleViewGUIDs", "scheduleViewGUIDs");
    put(
        &mut body,
        "appointmentTypeGUID",
        ctx.param_or_default(
            params,
            "appointmentTypeGUID",
            &ctx.tenant.default_appointment_type_id,
        ),
    );
    Value::Object(body)
}

fn validate_grouped_slots(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    if param_u64(params, "numberOfPatients", 2) == 0 {
        return Err(crate::error::EngineError::validation(
            "numberOfPatients must be at least 1 for action grouped_slots",
        ));
    }
    Ok(Validation::Valid)
}

fn build_grouped_slots(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = match build_slots(params, ctx) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert(
        "numberOfPatients".to_string(),
        Value::from(param_u64(params, "numberOfPatients", 2)),
    );
    body.insert(
        "timeWindowMinutes".to_string(),
        Value::from(param_u64(params, "timeWindowMinutes", 30)),
    );
    Value::Object(body)
}

fn validate_book(params: &Params, ctx: &BuildContext<'_>) -> Result<Validation> {
    let missing = missing_fields(params, &[
        ("patientGUID", None),
        ("startTime", None),
        ("scheduleViewGUID", None),
        ("scheduleColumnGUID", None),
        ("appointmentTypeGUID", ctx.tenant.default_appointment_type_id.clone()),
    ]);
    if missing.is_empty() {
        Ok(Validation::Valid)
    } else {
        Ok(Validation::Guided(missing_booking_fields_payload("book_child", &missing)))
    }
}

fn build_book(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    copy(&mut body, params, "patientGUID", "patientGUID");
    copy(&mut body, params, "startTime", "startTime");
    copy(&mut body, params, "scheduleViewGUID", "scheduleViewGUID");
    copy(&mut body, params, "scheduleColumnGUID", "scheduleColumnGUID");
    put(
        &mut body,
        "appointmentTypeGUID",
        ctx.param_or_default(
            params,
            "appointmentTypeGUID",
            &ctx.tenant.default_appointment_type_id,
        ),
    );
    body.insert("minutes".to_string(), Value::from(param_u64(params, "minutes", 45)));
    copy(&mut body, params, "childName", "childName");
    put(
        &mut body,
        "providerGUID",
        ctx.param_or_default(params, "providerGUID", &ctx.tenant.default_provider_id),
    );
    Value::Object(body)
}

fn validate_cancel(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(params, &["appointmentGUID"], "appointment identifier", "cancel")?;
    Ok(Validation::Valid)
}

fn build_cancel(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    put(&mut body, "appointmentGUID", param_str(params, "appointmentGUID"));
    Value::Object(body)
}
