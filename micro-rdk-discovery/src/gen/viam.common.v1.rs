// @generated
/// ResourceName contains the fields needed to identify a resource
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceName {
    #[prost(string, tag="1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag="2")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(string, tag="3")]
    pub subtype: ::prost::alloc::string::String,
    #[prost(string, tag="4")]
    pub name: ::prost::alloc::string::String,
}
/// DoCommandRequest represents a generic DoCommand input
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DoCommandRequest {
    #[prost(string, tag="1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag="2")]
    pub command: ::core::option::Option<super::super::super::google::protobuf::Struct>,
}
/// DoCommandResponse represents a generic DoCommand output
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DoCommandResponse {
    #[prost(message, optional, tag="1")]
    pub result: ::core::option::Option<super::super::super::google::protobuf::Struct>,
}
// @@protoc_insertion_point(module)
