//! Schema discovery over the gRPC server reflection protocol (v1, with a
//! v1alpha fallback).
//!
//! Every resolution opens its own reflection stream on the pooled channel
//! and releases it when the `ReflectionSession` is dropped, on success and on
//! every error path. The channel itself stays pooled.
//!
//! Nothing discovered here is cached: each call sees the server's current schema.

use crate::error::CallError;
use crate::pool::Connection;
use prost::Message;
use prost_reflect::{DescriptorPool, MessageDescriptor, MethodDescriptor, ServiceDescriptor};
use prost_types::FileDescriptorProto;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Code, Status, Streaming};
use tonic_reflection::pb::v1;
use tonic_reflection::pb::v1::server_reflection_request::MessageRequest;
use tonic_reflection::pb::v1::server_reflection_response::MessageResponse;
use tonic_reflection::pb::v1alpha;
use tracing::{debug, trace};

/// Failures while talking to the reflection service.
#[derive(Debug, Error)]
pub enum ReflectionError {
    #[error("reflection request failed: {0}")]
    Transport(#[from] Status),

    #[error("reflection stream closed before a response arrived")]
    StreamClosed,

    #[error("server rejected reflection request ({code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("unexpected reflection response: {0}")]
    Unexpected(&'static str),

    #[error("invalid file descriptor from server: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("inconsistent descriptors from server: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),

    #[error("reflection timed out after {0:?}")]
    Timeout(Duration),
}

/// One open bidirectional reflection stream, in whichever protocol
/// version the server answered. Requests and responses are expressed in v1
/// terms; v1alpha carries the same messages under another package.
enum ReflectionStream {
    V1 {
        requests: mpsc::Sender<v1::ServerReflectionRequest>,
        responses: Streaming<v1::ServerReflectionResponse>,
    },
    V1Alpha {
        requests: mpsc::Sender<v1alpha::ServerReflectionRequest>,
        responses: Streaming<v1alpha::ServerReflectionResponse>,
    },
}

impl ReflectionStream {
    /// The first request is queued before the stream opens; some servers hold
    /// response headers until they have a message to answer.
    async fn open_v1(channel: Channel, first: MessageRequest) -> Result<Self, ReflectionError> {
        let (requests, rx) = mpsc::channel(8);
        requests
            .send(v1::ServerReflectionRequest {
                host: String::new(),
                message_request: Some(first),
            })
            .await
            .map_err(|_| ReflectionError::StreamClosed)?;
        let responses = v1::server_reflection_client::ServerReflectionClient::new(channel)
            .server_reflection_info(ReceiverStream::new(rx))
            .await?
            .into_inner();
        Ok(Self::V1 {
            requests,
            responses,
        })
    }

    async fn open_v1alpha(channel: Channel, first: MessageRequest) -> Result<Self, ReflectionError> {
        let (requests, rx) = mpsc::channel(8);
        requests
            .send(v1alpha::ServerReflectionRequest {
                host: String::new(),
                message_request: Some(to_v1alpha(first)),
            })
            .await
            .map_err(|_| ReflectionError::StreamClosed)?;
        let responses = v1alpha::server_reflection_client::ServerReflectionClient::new(channel)
            .server_reflection_info(ReceiverStream::new(rx))
            .await?
            .into_inner();
        Ok(Self::V1Alpha {
            requests,
            responses,
        })
    }

    async fn send(&mut self, request: MessageRequest) -> Result<(), ReflectionError> {
        let sent = match self {
            Self::V1 { requests, .. } => requests
                .send(v1::ServerReflectionRequest {
                    host: String::new(),
                    message_request: Some(request),
                })
                .await
                .is_ok(),
            Self::V1Alpha { requests, .. } => requests
                .send(v1alpha::ServerReflectionRequest {
                    host: String::new(),
                    message_request: Some(to_v1alpha(request)),
                })
                .await
                .is_ok(),
        };
        if sent {
            Ok(())
        } else {
            Err(ReflectionError::StreamClosed)
        }
    }

    async fn next(&mut self) -> Result<MessageResponse, ReflectionError> {
        let response = match self {
            Self::V1 { responses, .. } => responses
                .message()
                .await?
                .ok_or(ReflectionError::StreamClosed)?
                .message_response,
            Self::V1Alpha { responses, .. } => responses
                .message()
                .await?
                .ok_or(ReflectionError::StreamClosed)?
                .message_response
                .map(from_v1alpha),
        };
        response.ok_or(ReflectionError::Unexpected("empty message_response"))
    }
}

fn to_v1alpha(request: MessageRequest) -> v1alpha::server_reflection_request::MessageRequest {
    use v1alpha::server_reflection_request::MessageRequest as Alpha;
    match request {
        MessageRequest::FileByFilename(name) => Alpha::FileByFilename(name),
        MessageRequest::FileContainingSymbol(symbol) => Alpha::FileContainingSymbol(symbol),
        MessageRequest::FileContainingExtension(ext) => {
            Alpha::FileContainingExtension(v1alpha::ExtensionRequest {
                containing_type: ext.containing_type,
                extension_number: ext.extension_number,
            })
        }
        MessageRequest::AllExtensionNumbersOfType(name) => Alpha::AllExtensionNumbersOfType(name),
        MessageRequest::ListServices(filter) => Alpha::ListServices(filter),
    }
}

fn from_v1alpha(response: v1alpha::server_reflection_response::MessageResponse) -> MessageResponse {
    use v1alpha::server_reflection_response::MessageResponse as Alpha;
    match response {
        Alpha::FileDescriptorResponse(files) => {
            MessageResponse::FileDescriptorResponse(v1::FileDescriptorResponse {
                file_descriptor_proto: files.file_descriptor_proto,
            })
        }
        Alpha::AllExtensionNumbersResponse(numbers) => {
            MessageResponse::AllExtensionNumbersResponse(v1::ExtensionNumberResponse {
                base_type_name: numbers.base_type_name,
                extension_number: numbers.extension_number,
            })
        }
        Alpha::ListServicesResponse(list) => MessageResponse::ListServicesResponse(v1::ListServiceResponse {
            service: list
                .service
                .into_iter()
                .map(|s| v1::ServiceResponse { name: s.name })
                .collect(),
        }),
        Alpha::ErrorResponse(err) => MessageResponse::ErrorResponse(v1::ErrorResponse {
            error_code: err.error_code,
            error_message: err.error_message,
        }),
    }
}

/// A scoped reflection stream. Dropping it closes the stream.
pub struct ReflectionSession {
    channel: Channel,
    stream: Option<ReflectionStream>,
    address: String,
}

impl ReflectionSession {
    pub fn new(conn: &Connection) -> Self {
        Self {
            channel: conn.channel(),
            stream: None,
            address: conn.address().to_string(),
        }
    }

    /// Protocol version in use, once the stream is open.
    pub fn version(&self) -> Option<&'static str> {
        self.stream.as_ref().map(|stream| match stream {
            ReflectionStream::V1 { .. } => "v1",
            ReflectionStream::V1Alpha { .. } => "v1alpha",
        })
    }

    /// Send one request and wait for its response.
    async fn round_trip(&mut self, request: MessageRequest) -> Result<MessageResponse, ReflectionError> {
        let response = match self.stream.as_mut() {
            Some(stream) => {
                stream.send(request).await?;
                stream.next().await?
            }
            None => self.open(request).await?,
        };

        match response {
            MessageResponse::ErrorResponse(err) => Err(ReflectionError::Rejected {
                code: err.error_code,
                message: err.error_message,
            }),
            other => Ok(other),
        }
    }

    /// Open the stream with `first` as its opening request. Speaks v1 and
    /// falls back to v1alpha when the server does not implement v1.
    async fn open(&mut self, first: MessageRequest) -> Result<MessageResponse, ReflectionError> {
        trace!("Opening reflection stream to {}", self.address);
        let attempt = async {
            let mut stream = ReflectionStream::open_v1(self.channel.clone(), first.clone()).await?;
            let response = stream.next().await?;
            Ok::<_, ReflectionError>((stream, response))
        }
        .await;

        let (stream, response) = match attempt {
            Err(ReflectionError::Transport(status)) if status.code() == Code::Unimplemented => {
                debug!("{} has no v1 reflection, falling back to v1alpha", self.address);
                let mut stream = ReflectionStream::open_v1alpha(self.channel.clone(), first).await?;
                let response = stream.next().await?;
                (stream, response)
            }
            other => other?,
        };

        self.stream = Some(stream);
        Ok(response)
    }

    async fn file_descriptors(&mut self, request: MessageRequest) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        match self.round_trip(request).await? {
            MessageResponse::FileDescriptorResponse(files) => files
                .file_descriptor_proto
                .iter()
                .map(|bytes| FileDescriptorProto::decode(bytes.as_slice()).map_err(ReflectionError::from))
                .collect(),
            _ => Err(ReflectionError::Unexpected("expected a file descriptor response")),
        }
    }

    /// Files defining `symbol`, possibly with some of their dependencies.
    pub async fn file_containing_symbol(&mut self, symbol: &str) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        self.file_descriptors(MessageRequest::FileContainingSymbol(symbol.to_string()))
            .await
    }

    pub async fn file_by_filename(&mut self, filename: &str) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        self.file_descriptors(MessageRequest::FileByFilename(filename.to_string()))
            .await
    }

    /// Fully qualified names of every service the server advertises.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionError> {
        match self.round_trip(MessageRequest::ListServices(String::new())).await? {
            MessageResponse::ListServicesResponse(list) => {
                Ok(list.service.into_iter().map(|s| s.name).collect())
            }
            _ => Err(ReflectionError::Unexpected("expected a list services response")),
        }
    }

    /// Build a descriptor pool holding `symbol`'s file and all of its transitive imports.
    pub async fn descriptor_pool_for(&mut self, symbol: &str) -> Result<DescriptorPool, ReflectionError> {
        let mut files: HashMap<String, FileDescriptorProto> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        for file in self.file_containing_symbol(symbol).await? {
            missing.extend(file.dependency.iter().cloned());
            files.insert(file.name().to_string(), file);
        }

        while let Some(name) = missing.pop() {
            if files.contains_key(&name) {
                continue;
            }
            debug!("Fetching dependency {} from {}", name, self.address);
            for file in self.file_by_filename(&name).await? {
                missing.extend(file.dependency.iter().cloned());
                files.insert(file.name().to_string(), file);
            }
        }

        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_protos(files.into_values())?;
        Ok(pool)
    }
}

impl Drop for ReflectionSession {
    fn drop(&mut self) {
        trace!("Reflection session to {} released", self.address);
    }
}

/// A resolved unary or streaming method, scoped to the call that resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSchema {
    descriptor: MethodDescriptor,
}

impl MethodSchema {
    pub fn new(descriptor: MethodDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn method_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn service_name(&self) -> String {
        self.descriptor.parent_service().full_name().to_string()
    }

    pub fn input_type(&self) -> MessageDescriptor {
        self.descriptor.input()
    }

    pub fn output_type(&self) -> MessageDescriptor {
        self.descriptor.output()
    }

    pub fn is_unary(&self) -> bool {
        !self.descriptor.is_client_streaming() && !self.descriptor.is_server_streaming()
    }

    /// HTTP/2 path of the method: `/package.Service/Method`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service_name(), self.method_name())
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }
}

/// Exact, case-sensitive lookup; the first match wins.
pub fn find_method(service: &ServiceDescriptor, method: &str) -> Result<MethodSchema, CallError> {
    service
        .methods()
        .find(|m| m.name() == method)
        .map(MethodSchema::new)
        .ok_or_else(|| CallError::method_not_found(service.full_name(), method))
}

/// Resolves method schemas from a live server.
#[derive(Debug, Clone, Default)]
pub struct SchemaResolver {
    timeout: Option<Duration>,
}

impl SchemaResolver {
    /// `timeout` bounds all reflection round trips of one resolution.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    #[tracing::instrument(skip(self, conn), fields(address = %conn.address()))]
    pub async fn resolve(
        &self,
        conn: &Connection,
        service: &str,
        method: &str,
    ) -> Result<MethodSchema, CallError> {
        let mut session = ReflectionSession::new(conn);

        let fetched = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, session.descriptor_pool_for(service))
                .await
                .unwrap_or(Err(ReflectionError::Timeout(limit))),
            None => session.descriptor_pool_for(service).await,
        };
        let pool = fetched.map_err(|e| CallError::service_not_found(service, e))?;

        let service_desc = pool.get_service_by_name(service).ok_or_else(|| {
            CallError::service_not_found(service, "service not defined in returned descriptors")
        })?;

        let schema = find_method(&service_desc, method)?;
        debug!(
            "Resolved {} ({} -> {})",
            schema.path(),
            schema.input_type().full_name(),
            schema.output_type().full_name()
        );
        Ok(schema)
    }

    /// List the services a server exposes through reflection.
    ///
    /// Listing is not a call stage, so failures are reported as they are.
    pub async fn list_services(&self, conn: &Connection) -> Result<Vec<String>, ReflectionError> {
        let mut session = ReflectionSession::new(conn);
        let listed = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, session.list_services())
                .await
                .unwrap_or(Err(ReflectionError::Timeout(limit))),
            None => session.list_services().await,
        };
        if let Ok(ref services) = listed {
            debug!("{} advertises {} services", conn.address(), services.len());
        }
        listed
    }
}
