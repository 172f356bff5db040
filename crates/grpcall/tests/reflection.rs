//! Schema resolution through server reflection.

mod support;

use grpcall::{ConnectionPool, ErrorCode, ReflectionError, ReflectionSession, SchemaResolver, Target};
use grpcallconf::DialConfig;
use std::time::Duration;
use support::Reflection;
use tonic::Code;

#[tokio::test]
async fn resolves_method_schema() {
    let server = support::spawn().await;
    let pool = ConnectionPool::new(DialConfig::default());
    let conn = pool.acquire(&Target::new(server.address(), false)).await.unwrap();

    let schema = SchemaResolver::default()
        .resolve(&conn, support::SERVICE, "Echo")
        .await
        .unwrap();

    assert_eq!(schema.path(), "/test.echo.v1.EchoService/Echo");
    assert_eq!(schema.input_type().full_name(), "test.echo.v1.EchoRequest");
    assert_eq!(schema.output_type().full_name(), "test.echo.v1.EchoReply");
    assert!(schema.is_unary());
}

#[tokio::test]
async fn every_call_resolves_fresh() {
    let server = support::spawn().await;
    let pool = ConnectionPool::new(DialConfig::default());
    let conn = pool.acquire(&Target::new(server.address(), false)).await.unwrap();
    let resolver = SchemaResolver::new(Some(Duration::from_secs(5)));

    for _ in 0..3 {
        let schema = resolver.resolve(&conn, support::SERVICE, "Slow").await.unwrap();
        assert_eq!(schema.method_name(), "Slow");
    }
}

#[tokio::test]
async fn lists_advertised_services() {
    let server = support::spawn().await;
    let pool = ConnectionPool::new(DialConfig::default());
    let conn = pool.acquire(&Target::new(server.address(), false)).await.unwrap();

    let services = SchemaResolver::default().list_services(&conn).await.unwrap();
    assert!(services.iter().any(|s| s == support::SERVICE), "{:?}", services);
}

#[tokio::test]
async fn missing_symbol_is_service_not_found() {
    let server = support::spawn().await;
    let pool = ConnectionPool::new(DialConfig::default());
    let conn = pool.acquire(&Target::new(server.address(), false)).await.unwrap();

    let err = SchemaResolver::default()
        .resolve(&conn, "pkg.Missing", "Echo")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServiceNotFound);
}

#[tokio::test]
async fn falls_back_to_v1alpha() {
    let server = support::spawn_with(Reflection::V1Alpha).await;
    let pool = ConnectionPool::new(DialConfig::default());
    let conn = pool.acquire(&Target::new(server.address(), false)).await.unwrap();

    let mut session = ReflectionSession::new(&conn);
    let services = session.list_services().await.unwrap();
    assert_eq!(session.version(), Some("v1alpha"));
    assert!(services.iter().any(|s| s == support::SERVICE), "{:?}", services);

    let schema = SchemaResolver::default()
        .resolve(&conn, support::SERVICE, "Echo")
        .await
        .unwrap();
    assert_eq!(schema.output_type().full_name(), "test.echo.v1.EchoReply");
}

#[tokio::test]
async fn v1_is_preferred() {
    let server = support::spawn().await;
    let pool = ConnectionPool::new(DialConfig::default());
    let conn = pool.acquire(&Target::new(server.address(), false)).await.unwrap();

    let mut session = ReflectionSession::new(&conn);
    session.list_services().await.unwrap();
    assert_eq!(session.version(), Some("v1"));
}

#[tokio::test]
async fn listing_without_reflection_reports_unimplemented() {
    let server = support::spawn_with(Reflection::None).await;
    let pool = ConnectionPool::new(DialConfig::default());
    let conn = pool.acquire(&Target::new(server.address(), false)).await.unwrap();

    let err = SchemaResolver::default().list_services(&conn).await.unwrap_err();
    assert!(
        matches!(err, ReflectionError::Transport(ref status) if status.code() == Code::Unimplemented),
        "{:?}",
        err
    );
    assert!(!err.to_string().contains("'*'"), "{}", err);
}
