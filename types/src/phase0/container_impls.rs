use crate::{
    encoding::HashTreeRoot,
    phase0::containers::{
        AggregateAndProof, Attestation, AttestationData, BeaconBlockHeader, Checkpoint, ForkData,
        SigningData, VoluntaryExit,
    },
};

impl HashTreeRoot for AggregateAndProof {}

impl HashTreeRoot for Attestation {}

impl HashTreeRoot for AttestationData {}

impl HashTreeRoot for BeaconBlockHeader {}

impl HashTreeRoot for Checkpoint {}

impl HashTreeRoot for ForkData {}

impl HashTreeRoot for SigningData {}

impl HashTreeRoot for VoluntaryExit {}
