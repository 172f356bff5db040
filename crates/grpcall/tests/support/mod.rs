//! In-process gRPC server for integration tests.
//!
//! Serves `test.echo.v1.EchoService` (descriptors built in code, no protoc)
//! plus the v1 reflection service, on an ephemeral localhost port.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;

use grpcall::codec::DynamicCodec;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::body::BoxBody;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::server::{NamedService, UnaryService};
use tonic::transport::Server;
use tonic::{Request, Response, Status};

pub const SERVICE: &str = "test.echo.v1.EchoService";

/// How long `Slow` sleeps before answering.
pub const SLOW_DELAY: Duration = Duration::from_secs(1);

fn field(name: &str, number: i32, ty: Type, label: Label, json_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        json_name: Some(json_name.to_string()),
        ..Default::default()
    }
}

fn method(name: &str, output: &str, server_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(".test.echo.v1.EchoRequest".to_string()),
        output_type: Some(format!(".test.echo.v1.{}", output)),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

/// `test/echo/v1/echo.proto`
pub fn echo_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("test/echo/v1/echo.proto".to_string()),
        package: Some("test.echo.v1".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("EchoRequest".to_string()),
                field: vec![
                    field("name", 1, Type::String, Label::Optional, "name"),
                    field("count", 2, Type::Int32, Label::Optional, "count"),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("EchoReply".to_string()),
                field: vec![
                    field("name", 1, Type::String, Label::Optional, "name"),
                    field("count", 2, Type::Int32, Label::Optional, "count"),
                ],
                ..Default::default()
            },
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("EchoService".to_string()),
            method: vec![
                method("Echo", "EchoReply", false),
                method("Slow", "EchoReply", false),
                method("Fail", "EchoReply", false),
                method("Watch", "EchoReply", true),
            ],
            ..Default::default()
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

pub fn echo_pool() -> DescriptorPool {
    let mut pool = DescriptorPool::new();
    pool.add_file_descriptor_proto(echo_file()).unwrap();
    pool
}

/// Copies every request field onto an `EchoReply`, optionally after a delay.
#[derive(Clone)]
struct EchoHandler {
    reply: MessageDescriptor,
    delay: Option<Duration>,
}

impl UnaryService<DynamicMessage> for EchoHandler {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<DynamicMessage>, Status>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move {
            if let Some(delay) = handler.delay {
                tokio::time::sleep(delay).await;
            }
            let request = request.into_inner();
            let mut reply = DynamicMessage::new(handler.reply);
            for (field, value) in request.fields() {
                reply.set_field_by_name(field.name(), value.clone());
            }
            Ok(Response::new(reply))
        })
    }
}

struct FailHandler;

impl UnaryService<DynamicMessage> for FailHandler {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<DynamicMessage>, Status>;

    fn call(&mut self, _request: Request<DynamicMessage>) -> Self::Future {
        Box::pin(async { Err(Status::failed_precondition("echo refused")) })
    }
}

/// Hand-rolled equivalent of a tonic-build generated server.
#[derive(Clone)]
pub struct EchoServer {
    request: MessageDescriptor,
    reply: MessageDescriptor,
}

impl EchoServer {
    pub fn new() -> Self {
        let pool = echo_pool();
        Self {
            request: pool.get_message_by_name("test.echo.v1.EchoRequest").unwrap(),
            reply: pool.get_message_by_name("test.echo.v1.EchoReply").unwrap(),
        }
    }
}

impl NamedService for EchoServer {
    const NAME: &'static str = SERVICE;
}

impl<B> Service<http::Request<B>> for EchoServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let codec = DynamicCodec::new(self.request.clone());
        let echo = |delay| EchoHandler {
            reply: self.reply.clone(),
            delay,
        };

        match req.uri().path() {
            "/test.echo.v1.EchoService/Echo" => {
                let handler = echo(None);
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(handler, req).await)
                })
            }
            "/test.echo.v1.EchoService/Slow" => {
                let handler = echo(Some(SLOW_DELAY));
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(handler, req).await)
                })
            }
            "/test.echo.v1.EchoService/Fail" => Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(codec);
                Ok(grpc.unary(FailHandler, req).await)
            }),
            _ => Box::pin(async move {
                let mut response = http::Response::new(empty_body());
                let headers = response.headers_mut();
                headers.insert(
                    tonic::Status::GRPC_STATUS,
                    (tonic::Code::Unimplemented as i32).into(),
                );
                headers.insert(
                    http::header::CONTENT_TYPE,
                    tonic::metadata::GRPC_CONTENT_TYPE,
                );
                Ok(response)
            }),
        }
    }
}

/// A running test server. Shuts down when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// `host:port`, as a caller would pass it.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Stop serving and wait for the listener to close.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Which reflection service the test server registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflection {
    None,
    V1,
    V1Alpha,
}

/// Start the echo server with v1 reflection on an ephemeral port.
pub async fn spawn() -> TestServer {
    spawn_with(Reflection::V1).await
}

pub async fn spawn_with(reflection: Reflection) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let mut router = Server::builder().add_service(EchoServer::new());
    let builder = tonic_reflection::server::Builder::configure().register_file_descriptor_set(
        FileDescriptorSet {
            file: vec![echo_file()],
        },
    );
    match reflection {
        Reflection::None => {}
        Reflection::V1 => router = router.add_service(builder.build_v1().unwrap()),
        Reflection::V1Alpha => router = router.add_service(builder.build_v1alpha().unwrap()),
    }

    let signal = shutdown.clone();
    let handle = tokio::spawn(async move {
        router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal.cancelled_owned())
            .await
            .unwrap();
    });

    TestServer {
        addr,
        shutdown,
        handle: Some(handle),
    }
}
