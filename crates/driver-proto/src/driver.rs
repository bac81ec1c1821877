// Bindings for proto/driver.proto (package `driver`).

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HealthCheckRequest {
    #[prost(string, tag = "1")]
    pub service: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HealthCheckResponse {
    #[prost(enumeration = "health_check_response::ServingStatus", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub errors: ::prost::alloc::vec::Vec<Error>,
}

/// Nested message and enum types in `HealthCheckResponse`.
pub mod health_check_response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ServingStatus {
        Unknown = 0,
        Serving = 1,
        NotServing = 2,
        ServiceUnknown = 3,
    }

    impl ServingStatus {
        /// String value of the enum field names used in the ProtoBuf definition.
        pub fn as_str_name(&self) -> &'static str {
            match self {
                ServingStatus::Unknown => "UNKNOWN",
                ServingStatus::Serving => "SERVING",
                ServingStatus::NotServing => "NOT_SERVING",
                ServingStatus::ServiceUnknown => "SERVICE_UNKNOWN",
            }
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(string, tag = "1")]
    pub project: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(bool, tag = "1")]
    pub status: bool,
    #[prost(string, tag = "2")]
    pub info: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub detail: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "4")]
    pub result: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableData {
    #[prost(string, tag = "1")]
    pub project: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub table_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub id: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "4")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SchemaRequest {
    #[prost(string, tag = "1")]
    pub request: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartRequest {
    #[prost(string, tag = "1")]
    pub request: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunRequest {
    #[prost(string, tag = "1")]
    pub request: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub serial_no: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub table_id: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub id: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "5")]
    pub command: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchRunRequest {
    #[prost(string, tag = "1")]
    pub request: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub serial_no: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub table_id: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "4")]
    pub id: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(bytes = "vec", tag = "5")]
    pub command: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Debug {
    #[prost(string, tag = "1")]
    pub request: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamResult {
    #[prost(string, tag = "1")]
    pub request: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

/// Generated client implementations.
pub mod driver_service_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::http::Uri;
    use tonic::codegen::*;

    /// Service exposed by the platform to driver processes.
    #[derive(Debug, Clone)]
    pub struct DriverServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl DriverServiceClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> DriverServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub fn with_origin(inner: T, origin: Uri) -> Self {
            let inner = tonic::client::Grpc::with_origin(inner, origin);
            Self { inner }
        }

        /// Limits the maximum size of a decoded message.
        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        /// Limits the maximum size of an encoded message.
        #[must_use]
        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        async fn ready(&mut self) -> std::result::Result<(), tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })
        }

        pub async fn health_check(
            &mut self,
            request: impl tonic::IntoRequest<super::HealthCheckRequest>,
        ) -> std::result::Result<tonic::Response<super::HealthCheckResponse>, tonic::Status>
        {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/HealthCheck");
            self.inner.unary(request.into_request(), path, codec).await
        }

        pub async fn write_point(
            &mut self,
            request: impl tonic::IntoRequest<super::Request>,
        ) -> std::result::Result<tonic::Response<super::Response>, tonic::Status> {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/WritePoint");
            self.inner.unary(request.into_request(), path, codec).await
        }

        pub async fn event(
            &mut self,
            request: impl tonic::IntoRequest<super::Request>,
        ) -> std::result::Result<tonic::Response<super::Response>, tonic::Status> {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/Event");
            self.inner.unary(request.into_request(), path, codec).await
        }

        pub async fn command_log(
            &mut self,
            request: impl tonic::IntoRequest<super::Request>,
        ) -> std::result::Result<tonic::Response<super::Response>, tonic::Status> {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/CommandLog");
            self.inner.unary(request.into_request(), path, codec).await
        }

        pub async fn update_table_data(
            &mut self,
            request: impl tonic::IntoRequest<super::TableData>,
        ) -> std::result::Result<tonic::Response<super::Response>, tonic::Status> {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/driver.DriverService/UpdateTableData");
            self.inner.unary(request.into_request(), path, codec).await
        }

        pub async fn schema_stream(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::StreamResult>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::SchemaRequest>>,
            tonic::Status,
        > {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/SchemaStream");
            self.inner
                .streaming(request.into_streaming_request(), path, codec)
                .await
        }

        pub async fn start_stream(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::StreamResult>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::StartRequest>>,
            tonic::Status,
        > {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/StartStream");
            self.inner
                .streaming(request.into_streaming_request(), path, codec)
                .await
        }

        pub async fn run_stream(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::StreamResult>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::RunRequest>>,
            tonic::Status,
        > {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/RunStream");
            self.inner
                .streaming(request.into_streaming_request(), path, codec)
                .await
        }

        pub async fn write_tag_stream(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::StreamResult>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::RunRequest>>,
            tonic::Status,
        > {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/driver.DriverService/WriteTagStream");
            self.inner
                .streaming(request.into_streaming_request(), path, codec)
                .await
        }

        pub async fn batch_run_stream(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::StreamResult>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::BatchRunRequest>>,
            tonic::Status,
        > {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/driver.DriverService/BatchRunStream");
            self.inner
                .streaming(request.into_streaming_request(), path, codec)
                .await
        }

        pub async fn debug_stream(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::Debug>,
        ) -> std::result::Result<tonic::Response<tonic::codec::Streaming<super::Debug>>, tonic::Status>
        {
            self.ready().await?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/driver.DriverService/DebugStream");
            self.inner
                .streaming(request.into_streaming_request(), path, codec)
                .await
        }
    }
}
