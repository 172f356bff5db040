//! Descriptor fixtures shared by unit tests.

use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, MethodDescriptorProto,
    ServiceDescriptorProto,
};

fn field(name: &str, number: i32, ty: Type, label: Label, type_name: Option<&str>) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        type_name: type_name.map(str::to_string),
        json_name: Some(json_name(name)),
        ..Default::default()
    }
}

fn json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn method(name: &str, server_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(".test.echo.v1.EchoMessage".to_string()),
        output_type: Some(".test.echo.v1.EchoMessage".to_string()),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

/// `test.echo.v1`: an `EchoMessage` with scalar, repeated and nested fields,
/// a flat `Scalars` message,
/// and an `EchoService` with unary `Echo` and server-streaming `Chatter`.
pub fn echo_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("test/echo/v1/echo.proto".to_string()),
        package: Some("test.echo.v1".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("Inner".to_string()),
                field: vec![field("label", 1, Type::String, Label::Optional, None)],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("Scalars".to_string()),
                field: vec![
                    field("flag", 1, Type::Bool, Label::Optional, None),
                    field("n", 2, Type::Int32, Label::Optional, None),
                    field("d", 3, Type::Double, Label::Optional, None),
                    field("s", 4, Type::String, Label::Optional, None),
                    field("values", 5, Type::Int32, Label::Repeated, None),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("EchoMessage".to_string()),
                field: vec![
                    field("name", 1, Type::String, Label::Optional, None),
                    field("count", 2, Type::Int64, Label::Optional, None),
                    field("tags", 3, Type::String, Label::Repeated, None),
                    field("inner", 4, Type::Message, Label::Optional, Some(".test.echo.v1.Inner")),
                    field("big", 5, Type::Uint64, Label::Optional, None),
                    field("display_name", 6, Type::String, Label::Optional, None),
                ],
                ..Default::default()
            },
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("EchoService".to_string()),
            method: vec![method("Echo", false), method("Chatter", true)],
            ..Default::default()
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

pub fn echo_pool() -> DescriptorPool {
    let mut pool = DescriptorPool::new();
    pool.add_file_descriptor_proto(echo_file())
        .expect("echo fixture is a valid descriptor");
    pool
}
