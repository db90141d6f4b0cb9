//! Action table for REST practice-API tenants

use serde_json::{Map, Value};

use super::{
    always_valid, copy, missing_booking_fields_payload, missing_fields, param_u64, put, require,
    ActionConfig, BuildContext, Endpoint, Validation,
};
use crate::core::HttpMethod;
use crate::error::{EngineError, Result};
use crate::normalize::{first_param, param_str, Params};
use crate::util::encode_path_segment;

pub const PATIENT_ACTIONS: &[ActionConfig] = &[
    ActionConfig {
        name: "lookup",
        endpoint: Endpoint::Static("patients/search"),
        method: HttpMethod::Post,
        build_body: build_lookup,
        validate: validate_lookup,
        success_label: "Patient search completed",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "get",
        endpoint: Endpoint::Dynamic(patient_path),
        method: HttpMethod::Get,
        build_body: build_empty,
        validate: validate_patient_ref,
        success_label: "Patient record retrieved",
        search: false,
        cacheable: true,
    },
    ActionConfig {
        name: "create",
        endpoint: Endpoint::Static("patients"),
        method: HttpMethod::Post,
        build_body: build_create,
        validate: validate_create,
        success_label: "Patient created",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "appointments",
        endpoint: Endpoint::Dynamic(patient_appointments_path),
        method: HttpMethod::Get,
        build_body: build_empty,
        validate: validate_patient_ref,
        success_label: "Patient appointments retrieved",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "clinic_info",
        endpoint: Endpoint::Dynamic(location_path),
        method: HttpMethod::Get,
        build_body: build_empty,
        validate: validate_location,
        success_label: "Clinic information retrieved",
        search: false,
        cacheable: true,
    },
];

pub const SCHEDULING_ACTIONS: &[ActionConfig] = &[
    ActionConfig {
        name: "slots",
        endpoint: Endpoint::Static("appointments/availability"),
        method: HttpMethod::Post,
        build_body: build_slots,
        validate: always_valid,
        success_label: "Available slots found",
        search: true,
        cacheable: false,
    },
    ActionConfig {
        name: "grouped_slots",
        endpoint: Endpoint::Static("appointments/availability/grouped"),
        method: HttpMethod::Post,
        build_body: build_grouped_slots,
        validate: always_valid,
        success_label: "Grouped sibling slots found",
        search: true,
        cacheable: false,
    },
    ActionConfig {
        name: "book_child",
        endpoint: Endpoint::Static("appointments"),
        method: HttpMethod::Post,
        build_body: build_book,
        validate: validate_book,
        success_label: "Appointment booked",
        search: false,
        cacheable: false,
    },
    ActionConfig {
        name: "cancel",
        endpoint: Endpoint::Dynamic(cancel_path),
        method: HttpMethod::Post,
        build_body: build_cancel,
        validate: validate_cancel,
        success_label: "Appointment cancelled",
        search: false,
        cacheable: false,
    },
];

fn path_segment(value: &str, key: &str) -> Result<String> {
    encode_path_segment(value)
        .ok_or_else(|| EngineError::validation(format!("{} is not a usable path segment", key)))
}

fn id_param(params: &Params, key: &str) -> Result<String> {
    let value = param_str(params, key)
        .ok_or_else(|| EngineError::validation(format!("missing {} for endpoint path", key)))?;
    path_segment(&value, key)
}

fn patient_path(params: &Params, _: &BuildContext<'_>) -> Result<String> {
    Ok(format!("patients/{}", id_param(params, "patientId")?))
}

fn patient_appointments_path(params: &Params, _: &BuildContext<'_>) -> Result<String> {
    Ok(format!("patients/{}/appointments", id_param(params, "patientId")?))
}

fn location_path(params: &Params, ctx: &BuildContext<'_>) -> Result<String> {
    let location = ctx
        .param_or_default(params, "locationId", &ctx.tenant.default_location_id)
        .ok_or_else(|| EngineError::validation("missing locationId for endpoint path"))?;
    Ok(format!("locations/{}", path_segment(&location, "locationId")?))
}

fn cancel_path(params: &Params, _: &BuildContext<'_>) -> Result<String> {
    Ok(format!("appointments/{}/cancel", id_param(params, "appointmentId")?))
}

fn base_body(ctx: &BuildContext<'_>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("correlationId".to_string(), Value::String(ctx.correlation_token.to_string()));
    body
}

fn build_empty(_: &Params, _: &BuildContext<'_>) -> Value {
    Value::Null
}

fn validate_lookup(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(params, &["phone", "phoneNumber", "name", "dateOfBirth"], "search criteria", "lookup")?;
    Ok(Validation::Valid)
}

fn build_lookup(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    put(&mut body, "phone", first_param(params, &["phone", "phoneNumber"]));
    copy(&mut body, params, "name", "name");
    copy(&mut body, params, "dateOfBirth", "dateOfBirth");
    put(
        &mut body,
        "locationId",
        ctx.param_or_default(params, "locationId", &ctx.tenant.default_location_id),
    );
    Value::Object(body)
}

fn validate_patient_ref(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(params, &["patientId"], "patient identifier", "get/appointments")?;
    Ok(Validation::Valid)
}

fn validate_location(params: &Params, ctx: &BuildContext<'_>) -> Result<Validation> {
    if param_str(params, "locationId").is_none() && ctx.tenant.default_location_id.is_none() {
        return Err(EngineError::validation(
            "missing location identifier for action clinic_info",
        ));
    }
    Ok(Validation::Valid)
}

fn validate_create(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(params, &["firstName"], "patient first name", "create")?;
    require(params, &["lastName"], "patient last name", "create")?;
    require(params, &["phone", "phoneNumber"], "patient phone number", "create")?;
    Ok(Validation::Valid)
}

fn build_create(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    copy(&mut body, params, "firstName", "firstName");
    copy(&mut body, params, "lastName", "lastName");
    put(&mut body, "phone", first_param(params, &["phone", "phoneNumber"]));
    copy(&mut body, params, "dateOfBirth", "dateOfBirth");
    copy(&mut body, params, "email", "email");
    put(
        &mut body,
        "providerId",
        ctx.param_or_default(params, "providerId", &ctx.tenant.default_provider_id),
    );
    put(
        &mut body,
        "locationId",
        ctx.param_or_default(params, "locationId", &ctx.tenant.default_location_id),
    );
    Value::Object(body)
}

fn build_slots(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    copy(&mut body, params, "startDate", "startDate");
    copy(&mut body, params, "endDate", "endDate");
    copy(&mut body, params, "providerIds", "providerIds");
    put(
        &mut body,
        "locationId",
        ctx.param_or_default(params, "locationId", &ctx.tenant.default_location_id),
    );
    put(
        &mut body,
        "appointmentTypeId",
        ctx.param_or_default(params, "appointmentTypeId", &ctx.tenant.default_appointment_type_id),
    );
    Value::Object(body)
}

fn build_grouped_slots(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = match build_slots(params, ctx) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert("patientCount".to_string(), Value::from(param_u64(params, "numberOfPatients", 2)));
    body.insert(
        "windowMinutes".to_string(),
        Value::from(param_u64(params, "timeWindowMinutes", 30)),
    );
    Value::Object(body)
}

fn validate_book(params: &Params, ctx: &BuildContext<'_>) -> Result<Validation> {
    let missing = missing_fields(params, &[
        ("patientId", None),
        ("startTime", None),
        ("providerId", ctx.tenant.default_provider_id.clone()),
        ("appointmentTypeId", ctx.tenant.default_appointment_type_id.clone()),
        ("locationId", ctx.tenant.default_location_id.clone()),
    ]);
    if missing.is_empty() {
        Ok(Validation::Valid)
    } else {
        Ok(Validation::Guided(missing_booking_fields_payload("book_child", &missing)))
    }
}

fn build_book(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    copy(&mut body, params, "patientId", "patientId");
    copy(&mut body, params, "startTime", "startTime");
    put(
        &mut body,
        "providerId",
        ctx.param_or_default(params, "providerId", &ctx.tenant.default_provider_id),
    );
    put(
        &mut body,
        "appointmentTypeId",
        ctx.param_or_default(params, "appointmentTypeId", &ctx.tenant.default_appointment_type_id),
    );
    put(
        &mut body,
        "locationId",
        ctx.param_or_default(params, "locationId", &ctx.tenant.default_location_id),
    );
    body.insert("durationMinutes".to_string(), Value::from(param_u64(params, "minutes", 45)));
    copy(&mut body, params, "note", "note");
    Value::Object(body)
}

fn validate_cancel(params: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    require(params, &["appointmentId"], "appointment identifier", "cancel")?;
    Ok(Validation::Valid)
}

fn build_cancel(params: &Params, ctx: &BuildContext<'_>) -> Value {
    let mut body = base_body(ctx);
    copy(&mut body, params, "reason", "reason");
    Value::Object(body)
}
