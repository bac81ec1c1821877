//! gRPC transport to the platform's `driver.DriverService`.
//!
//! Two channels are kept, as for any client that mixes unary calls and
//! long-lived streams: the unary channel carries a request timeout, the
//! streaming channel does not (a timeout would cut the command streams).

use async_trait::async_trait;
use driver_proto::driver_service_client::DriverServiceClient;
use driver_proto::health_check_response::ServingStatus as WireServingStatus;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};

use super::transport::{
    CommandMethod, CommandRequest, CommandResponse, CommandStream, HealthReport, Identity,
    Outbound, RemoteError, ServingStatus, Transport, TransportError, UnaryReply,
};
use crate::config::PlatformConfig;

/// Header carrying the project id.
pub const HEADER_PROJECT_ID: &str = "x-project-id";
/// Header carrying the driver id.
pub const HEADER_DRIVER_ID: &str = "x-driver-id";
/// Header carrying the hex-encoded driver name.
pub const HEADER_DRIVER_NAME: &str = "x-driver-name";
/// Header carrying the hex-encoded service instance id.
pub const HEADER_SERVICE_ID: &str = "x-service-id";

/// Maximum message size in either direction (16 MB).
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Production transport over tonic.
#[derive(Clone)]
pub struct GrpcTransport {
    unary: DriverServiceClient<Channel>,
    streaming: DriverServiceClient<Channel>,
    stream_buffer: usize,
}

impl GrpcTransport {
    /// Build the transport without connecting. The channels connect on first use
    /// and reconnect on their own; must be called inside a tokio runtime.
    pub fn connect_lazy(platform: &PlatformConfig, stream_buffer: usize) -> Result<Self, TransportError> {
        let invalid = |err: tonic::transport::Error| TransportError::InvalidEndpoint {
            endpoint: platform.endpoint.clone(),
            reason: err.to_string(),
        };

        let endpoint = Endpoint::from_shared(platform.endpoint.clone())
            .map_err(invalid)?
            .connect_timeout(platform.connect_timeout)
            .timeout(platform.request_timeout)
            .http2_keep_alive_interval(platform.keepalive_interval)
            .keep_alive_timeout(platform.keepalive_timeout)
            .keep_alive_while_idle(true);

        // No .timeout(): command streams stay open for the whole session.
        let streaming_endpoint = Endpoint::from_shared(platform.endpoint.clone())
            .map_err(invalid)?
            .connect_timeout(platform.connect_timeout)
            .http2_keep_alive_interval(platform.keepalive_interval)
            .keep_alive_timeout(platform.keepalive_timeout)
            .keep_alive_while_idle(true)
            .tcp_nodelay(true);

        tracing::debug!(endpoint = %platform.endpoint, "Platform transport configured");

        Ok(Self {
            unary: DriverServiceClient::new(endpoint.connect_lazy())
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
            streaming: DriverServiceClient::new(streaming_endpoint.connect_lazy())
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
            stream_buffer: stream_buffer.max(1),
        })
    }
}

/// The four identity headers. Free-form values are hex-encoded to stay ASCII.
pub(crate) fn identity_headers(identity: &Identity) -> [(&'static str, String); 4] {
    [
        (HEADER_PROJECT_ID, identity.project_id.clone()),
        (HEADER_DRIVER_ID, identity.driver_id.clone()),
        (HEADER_DRIVER_NAME, hex::encode(&identity.driver_name)),
        (HEADER_SERVICE_ID, hex::encode(&identity.service_id)),
    ]
}

fn tagged<T>(message: T, identity: &Identity) -> Result<tonic::Request<T>, TransportError> {
    let mut request = tonic::Request::new(message);
    for (header, value) in identity_headers(identity) {
        let value = MetadataValue::try_from(value.as_str())
            .map_err(|_| TransportError::InvalidMetadata { header })?;
        request.metadata_mut().insert(header, value);
    }
    Ok(request)
}

//==============================================================================
// Wire conversions
//==============================================================================

fn from_schema(message: driver_proto::SchemaRequest) -> CommandRequest {
    CommandRequest::new(message.request)
}

fn from_start(message: driver_proto::StartRequest) -> CommandRequest {
    CommandRequest::new(message.request).with_payload(message.data)
}

fn from_run(message: driver_proto::RunRequest) -> CommandRequest {
    let targets = if message.id.is_empty() {
        Vec::new()
    } else {
        vec![message.id]
    };
    CommandRequest::new(message.request)
        .with_serial_no(message.serial_no)
        .with_targets(message.table_id, targets)
        .with_payload(message.command)
}

fn from_batch_run(message: driver_proto::BatchRunRequest) -> CommandRequest {
    CommandRequest::new(message.request)
        .with_serial_no(message.serial_no)
        .with_targets(message.table_id, message.id)
        .with_payload(message.command)
}

fn from_debug(message: driver_proto::Debug) -> CommandRequest {
    CommandRequest::new(message.request).with_payload(message.data)
}

fn to_stream_result(response: CommandResponse) -> driver_proto::StreamResult {
    driver_proto::StreamResult {
        request: response.request_id,
        data: response.payload,
    }
}

/// Outgoing half of a `StreamResult` stream, tagged with the identity headers.
fn results(
    responses: mpsc::Receiver<CommandResponse>,
    identity: &Identity,
) -> Result<tonic::Request<impl Stream<Item = driver_proto::StreamResult> + Send + 'static>, TransportError> {
    tagged(ReceiverStream::new(responses).map(to_stream_result), identity)
}

fn to_debug(response: CommandResponse) -> driver_proto::Debug {
    driver_proto::Debug {
        request: response.request_id,
        data: response.payload,
    }
}

fn from_health(response: driver_proto::HealthCheckResponse) -> HealthReport {
    let status = match WireServingStatus::try_from(response.status) {
        Ok(WireServingStatus::Serving) => ServingStatus::Serving,
        Ok(WireServingStatus::NotServing) => ServingStatus::NotServing,
        Ok(WireServingStatus::ServiceUnknown) => ServingStatus::ServiceUnknown,
        Ok(WireServingStatus::Unknown) | Err(_) => ServingStatus::Unknown,
    };
    HealthReport {
        status,
        errors: response
            .errors
            .into_iter()
            .map(|err| RemoteError {
                code: err.code.to_string(),
                message: err.message,
            })
            .collect(),
    }
}

fn from_reply(response: driver_proto::Response) -> UnaryReply {
    UnaryReply {
        status: response.status,
        info: response.info,
        detail: response.detail,
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn open(&self, method: CommandMethod, identity: &Identity) -> Result<CommandStream, TransportError> {
        let (outbound, responses) = mpsc::channel::<CommandResponse>(self.stream_buffer);
        let mut client = self.streaming.clone();
        let open_failed = |status: tonic::Status| TransportError::Open {
            method,
            reason: status.to_string(),
        };
        let stream_failed = move |status: tonic::Status| TransportError::Stream {
            method,
            reason: status.to_string(),
        };

        let inbound = match method {
            CommandMethod::Debug => {
                let request = tagged(ReceiverStream::new(responses).map(to_debug), identity)?;
                client
                    .debug_stream(request)
                    .await
                    .map_err(open_failed)?
                    .into_inner()
                    .map(move |item| item.map(from_debug).map_err(stream_failed))
                    .boxed()
            }
            CommandMethod::Schema => client
                .schema_stream(results(responses, identity)?)
                .await
                .map_err(open_failed)?
                .into_inner()
                .map(move |item| item.map(from_schema).map_err(stream_failed))
                .boxed(),
            CommandMethod::Start => client
                .start_stream(results(responses, identity)?)
                .await
                .map_err(open_failed)?
                .into_inner()
                .map(move |item| item.map(from_start).map_err(stream_failed))
                .boxed(),
            CommandMethod::Run => client
                .run_stream(results(responses, identity)?)
                .await
                .map_err(open_failed)?
                .into_inner()
                .map(move |item| item.map(from_run).map_err(stream_failed))
                .boxed(),
            CommandMethod::WriteTag => client
                .write_tag_stream(results(responses, identity)?)
                .await
                .map_err(open_failed)?
                .into_inner()
                .map(move |item| item.map(from_run).map_err(stream_failed))
                .boxed(),
            CommandMethod::BatchRun => client
                .batch_run_stream(results(responses, identity)?)
                .await
                .map_err(open_failed)?
                .into_inner()
                .map(move |item| item.map(from_batch_run).map_err(stream_failed))
                .boxed(),
        };

        tracing::debug!(method = %method, "Command stream open");
        Ok(CommandStream { inbound, outbound })
    }

    async fn health_check(&self, identity: &Identity) -> Result<HealthReport, TransportError> {
        let request = tagged(
            driver_proto::HealthCheckRequest {
                service: driver_proto::SERVICE_NAME.to_string(),
            },
            identity,
        )?;
        let response = self
            .unary
            .clone()
            .health_check(request)
            .await
            .map_err(|status| TransportError::Rpc {
                operation: "healthCheck",
                reason: status.to_string(),
            })?;
        Ok(from_health(response.into_inner()))
    }

    async fn send(&self, identity: &Identity, message: Outbound) -> Result<UnaryReply, TransportError> {
        let operation = message.name();
        let mut client = self.unary.clone();
        let project = identity.project_id.clone();

        let result = match message {
            Outbound::Point { data } => {
                client
                    .write_point(tagged(driver_proto::Request { project, data }, identity)?)
                    .await
            }
            Outbound::Event { data } => {
                client
                    .event(tagged(driver_proto::Request { project, data }, identity)?)
                    .await
            }
            Outbound::CommandLog { data } => {
                client
                    .command_log(tagged(driver_proto::Request { project, data }, identity)?)
                    .await
            }
            Outbound::UpdateTableData {
                table_id,
                row_id,
                data,
            } => {
                let message = driver_proto::TableData {
                    project,
                    table_id,
                    id: row_id,
                    data,
                };
                client.update_table_data(tagged(message, identity)?).await
            }
        };

        result
            .map(|response| from_reply(response.into_inner()))
            .map_err(|status| TransportError::Rpc {
                operation,
                reason: status.to_string(),
            })
    }
}
