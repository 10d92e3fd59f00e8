use crate::error::Result;

pub trait Keypair {
    type PublicKeyType: PublicKey;
    type PrivateKeyType: PrivateKey<PublicKeyType = Self::PublicKeyType>;

    fn generate() -> Self;

    fn sign<T>(
        &self,
        message: T,
        context: Option<&[u8]>,
    ) -> Result<<Self::PublicKeyType as PublicKey>::SignatureType>
    where
        T: AsRef<[u8]>;

    fn public_key(&self) -> Self::PublicKeyType;

    fn private_key(&self) -> &Self::PrivateKeyType;
}

pub trait PrivateKey: Sized {
    type PublicKeyType: PublicKey;

    fn public_key(&self) -> Self::PublicKeyType;

    fn sign<T>(
        &self,
        message: T,
        context: Option<&[u8]>,
        public_key: Self::PublicKeyType,
    ) -> Result<<Self::PublicKeyType as PublicKey>::SignatureType>
    where
        T: AsRef<[u8]>;

    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    fn as_bytes(&self) -> &[u8];
}

pub trait PublicKey: Sized {
    type SignatureType: Signature;

    fn verify<T: AsRef<[u8]>>(
        &self,
        signature: &Self::SignatureType,
        message: T,
        context: Option<&[u8]>,
    ) -> Result<()>;

    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    fn as_bytes(&self) -> &[u8];
}

pub trait Signature {}
