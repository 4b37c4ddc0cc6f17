pub use crate::{
    bls_to_execution_change_broadcaster::{
        is_trigger_slot as is_bls_to_execution_change_rebroadcast_slot,
        Broadcaster as BlsToExecutionChangeBroadcaster,
    },
    manager::Manager,
    messages::PoolToP2pMessage,
    pool::{Error, OperationPool, PoolOperation},
};

pub mod bls_to_execution_change_broadcaster;

mod manager;
mod messages;
mod pool;
