// @generated
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ComponentConfig {
    #[prost(string, tag="1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag="2")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag="3")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(string, tag="4")]
    pub model: ::prost::alloc::string::String,
    #[prost(string, repeated, tag="6")]
    pub depends_on: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, repeated, tag="7")]
    pub service_configs: ::prost::alloc::vec::Vec<ResourceLevelServiceConfig>,
    #[prost(message, optional, tag="8")]
    pub attributes: ::core::option::Option<super::super::super::google::protobuf::Struct>,
    #[prost(string, tag="9")]
    pub api: ::prost::alloc::string::String,
}
/// A ResourceLevelServiceConfig describes component or remote configuration for a service.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceLevelServiceConfig {
    #[prost(string, tag="1")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(message, optional, tag="2")]
    pub attributes: ::core::option::Option<super::super::super::google::protobuf::Struct>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceConfig {
    #[prost(string, tag="1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag="2")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag="3")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(message, optional, tag="4")]
    pub attributes: ::core::option::Option<super::super::super::google::protobuf::Struct>,
    #[prost(string, repeated, tag="5")]
    pub depends_on: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag="6")]
    pub model: ::prost::alloc::string::String,
    #[prost(string, tag="9")]
    pub api: ::prost::alloc::string::String,
}
// @@protoc_insertion_point(module)
