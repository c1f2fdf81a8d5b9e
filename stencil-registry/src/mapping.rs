use chrono::{DateTime, Utc};
use stencil_common::{
    config::ParameterOption,
    error::Error,
    template::{Parameter, WorkflowTemplate},
};
use stencil_protobuf::v1::{
    ParameterOption as ParameterOptionProto, Parameter as ParameterProto,
    WorkflowTemplate as WorkflowTemplateProto,
};
use tonic::Status;
use uuid::Uuid;

pub(crate) fn error_to_status(e: Error) -> Status {
    let message = e.to_string();

    match e {
        Error::NotFound { .. } => Status::not_found(message),
        Error::InvalidInput(_) | Error::InvalidManifest(_) | Error::UnknownNodePool { .. } => {
            Status::invalid_argument(message)
        }
        Error::TemplateArchived { .. } => Status::failed_precondition(message),
        Error::AlreadyExists { .. } => Status::already_exists(message),
        Error::Conflict(_) => Status::aborted(message),
        Error::Cancelled => Status::cancelled(message),
        Error::Timeout => Status::deadline_exceeded(message),
        Error::ConfigParse { .. }
        | Error::MissingConfig { .. }
        | Error::Serialization(_)
        | Error::Internal(_) => Status::internal(message),
    }
}

pub(crate) fn parse_id(id: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(id.trim())
        .map_err(|e| Status::invalid_argument(format!("Failed to parse template ID '{id}': {e}")))
}

fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

fn parameter_to_proto(param: Parameter) -> ParameterProto {
    ParameterProto {
        name: param.name,
        value: param.value,
        r#type: param.param_type.unwrap_or_default(),
        display_name: param.display_name.unwrap_or_default(),
        hint: param.hint.unwrap_or_default(),
        required: param.required,
        options: param
            .options
            .into_iter()
            .map(|ParameterOption { value, label }| ParameterOptionProto { name: label, value })
            .collect(),
    }
}

pub(crate) fn template_to_proto(template: WorkflowTemplate) -> WorkflowTemplateProto {
    let WorkflowTemplate { info, version } = template;

    WorkflowTemplateProto {
        id: info.id.to_string(),
        uid: info.uid,
        name: info.name,
        namespace: info.namespace,
        version: version.version,
        version_id: version.id.to_string(),
        manifest: version.content.manifest,
        generated_manifest: version.content.generated_manifest,
        is_archived: info.state.is_archived(),
        parameters: version
            .content
            .parameters
            .into_iter()
            .map(parameter_to_proto)
            .collect(),
        labels: info.labels.into_iter().collect(),
        created_at: Some(timestamp(info.created_at)),
        modified_at: Some(timestamp(info.modified_at)),
    }
}
