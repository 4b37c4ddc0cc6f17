pub mod config;
pub mod encoding;
pub mod nonstandard;
pub mod traits;

pub mod phase0 {
    pub mod beacon_state;
    pub mod consts;
    pub mod containers;
    pub mod primitives;

    mod container_impls;
}

pub mod capella {
    pub mod containers;

    mod container_impls;
}

pub mod deneb {
    pub mod containers;
    pub mod primitives;

    mod container_impls;
}
