// BLS12-381 aggregate signatures for spend bundles.
//
// Signing itself belongs to the host's key store; this crate only combines
// the signatures handed to it, the way a bundle needs them.

use std::fmt;

use blstrs::{G2Affine, G2Projective};
use group::{Curve, Group};

pub const SIGNATURE_SIZE: usize = 96;

/// A G2 point; the identity is the signature of a spend needing no keys
#[derive(Clone, Copy)]
pub struct Signature(G2Affine);

impl Signature {
    pub fn identity() -> Self {
        Signature(G2Projective::identity().to_affine())
    }

    pub fn is_identity(&self) -> bool {
        *self == Signature::identity()
    }

    pub fn from_bytes(bytes: &[u8; SIGNATURE_SIZE]) -> Option<Self> {
        Option::from(G2Affine::from_compressed(bytes)).map(Signature)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.0.to_compressed()
    }

    /// Point addition over every signature
    pub fn aggregate<'a, I>(signatures: I) -> Self
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        let sum = signatures
            .into_iter()
            .fold(G2Projective::identity(), |acc, sig| acc + G2Projective::from(sig.0));
        Signature(sum.to_affine())
    }
}

impl From<G2Projective> for Signature {
    fn from(point: G2Projective) -> Self {
        Signature(point.to_affine())
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::identity()
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Signature {}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.to_bytes()))
    }
}
