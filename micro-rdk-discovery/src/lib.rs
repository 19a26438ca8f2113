//! Viam discovery service for the micro-RDK.
//!
//! Hosts named [discovery](https://docs.viam.com/services/discovery/) services and serves the
//! `viam.service.discovery.v1.DiscoveryService` contract over gRPC and its REST transcoding.

pub mod common;

#[cfg(feature = "native")]
pub mod native;

/// gRPC protobuf utilities, auto-generated
pub mod google {
    pub mod rpc {
        #![allow(clippy::derive_partial_eq_without_eq)]
        include!("gen/google.rpc.rs");
    }
    pub mod protobuf {
        #![allow(clippy::derive_partial_eq_without_eq)]
        include!("gen/google.protobuf.rs");
    }
}

/// gRPC prototypes from definitions in [api repository](https://github.com/viamrobotics/api/tree/main/proto/viam), auto-generated
pub mod proto {

    // Don't bother to clippy generated proto code
    #![allow(clippy::all)]

    pub mod common {
        pub mod v1 {
            include!("gen/viam.common.v1.rs");
        }
    }

    pub mod app {
        pub mod v1 {
            include!("gen/viam.app.v1.rs");
        }
    }

    pub mod service {
        pub mod discovery {
            pub mod v1 {
                include!("gen/viam.service.discovery.v1.rs");
            }
        }
    }
}
