//! Solana legacy transaction wire format and multi-party signing.
//!
//! Transactions are built entirely by hand, no `solana-sdk` dependency.
//! The wire format is a compact binary layout:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```
//!
//! Signing is modelled as a type-state [`Envelope`]: the service signs first
//! (`Unsigned -> PartiallySigned`), the end user completes it elsewhere, and
//! only a `FullySigned` envelope can be handed to the ledger for submission.

use std::marker::PhantomData;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::address::Pubkey;
use crate::error::SolError;
use crate::keypair::TransactionSigner;

/// The Solana System Program public key: 32 zero bytes.
/// Base58: `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new([0u8; 32]);

const SIGNATURE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from a byte slice.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            SolError::SerializationError(
                "unexpected end of data while decoding compact-u16".into(),
            )
        })?;
        consumed += 1;

        value |= ((byte & 0x7f) as u32) << shift;
        shift += 7;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    if value > u16::MAX as u32 {
        return Err(SolError::SerializationError(
            "compact-u16 value overflow".into(),
        ));
    }

    Ok((value as u16, consumed))
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// A single account reference in a Solana instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolAccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl SolAccountMeta {
    pub fn writable_signer(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: true,
            is_writable: true,
        }
    }

    pub fn writable(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: false,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: false,
            is_writable: false,
        }
    }
}

/// A Solana instruction (before it is compiled into a message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the message's `account_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A compiled legacy message: the bytes every signer signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// All account keys referenced by this message, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<Pubkey>,

    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,

    pub recent_blockhash: [u8; 32],

    pub instructions: Vec<CompiledInstruction>,
}

/// Compile instructions into a message with a single fee payer.
///
/// The fee payer is always a writable signer at index 0.
pub fn compile_message(
    instructions: &[SolInstruction],
    fee_payer: &Pubkey,
    recent_blockhash: &[u8; 32],
) -> Result<Message, SolError> {
    struct AccountEntry {
        pubkey: Pubkey,
        is_signer: bool,
        is_writable: bool,
    }

    // Instruction account lists are tiny, a linear scan beats hashing.
    let mut entries: Vec<AccountEntry> = Vec::new();

    let mut upsert = |pubkey: Pubkey, signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    upsert(*fee_payer, true, true);

    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        // Program IDs are non-signer, read-only accounts.
        upsert(ix.program_id, false, false);
    }

    // Stable sort: insertion order is kept within each category, so the fee
    // payer stays first among writable signers.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    if entries.first().map(|e| e.pubkey) != Some(*fee_payer) {
        return Err(SolError::TransactionBuildError(
            "fee payer is not the first account".into(),
        ));
    }
    if entries.len() > u8::MAX as usize {
        return Err(SolError::TransactionBuildError(format!(
            "{} accounts exceeds the u8 index space",
            entries.len()
        )));
    }

    let num_signers = entries.iter().filter(|e| e.is_signer).count() as u8;
    let num_readonly_signed = entries
        .iter()
        .filter(|e| e.is_signer && !e.is_writable)
        .count() as u8;
    let num_readonly_unsigned = entries
        .iter()
        .filter(|e| !e.is_signer && !e.is_writable)
        .count() as u8;

    let account_keys: Vec<Pubkey> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &Pubkey| -> Result<u8, SolError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| SolError::TransactionBuildError(format!("{key} not in account keys")))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let program_id_index = index_of(&ix.program_id)?;
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<_>, _>>()?;

        compiled.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(Message {
        account_keys,
        num_required_signatures: num_signers,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        instructions: compiled,
    })
}

impl Message {
    /// Serialize the message (the bytes that get signed).
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);

        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed);
        buf.push(self.num_readonly_unsigned);

        buf.extend_from_slice(&encode_compact_u16(self.account_keys.len() as u16));
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_ref());
        }

        buf.extend_from_slice(&self.recent_blockhash);

        buf.extend_from_slice(&encode_compact_u16(self.instructions.len() as u16));
        for ix in &self.instructions {
            buf.push(ix.program_id_index);

            buf.extend_from_slice(&encode_compact_u16(ix.account_indices.len() as u16));
            buf.extend_from_slice(&ix.account_indices);

            buf.extend_from_slice(&encode_compact_u16(ix.data.len() as u16));
            buf.extend_from_slice(&ix.data);
        }

        buf
    }

    /// Parse a serialized legacy message.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SolError> {
        let mut reader = Reader::new(bytes);

        let num_required_signatures = reader.u8()?;
        if num_required_signatures & 0x80 != 0 {
            return Err(SolError::SerializationError(
                "versioned messages are not supported".into(),
            ));
        }
        let num_readonly_signed = reader.u8()?;
        let num_readonly_unsigned = reader.u8()?;

        let num_accounts = reader.compact_u16()?;
        let mut account_keys = Vec::with_capacity(num_accounts as usize);
        for _ in 0..num_accounts {
            account_keys.push(Pubkey::new(reader.array::<32>()?));
        }

        let recent_blockhash = reader.array::<32>()?;

        let num_instructions = reader.compact_u16()?;
        let mut instructions = Vec::with_capacity(num_instructions as usize);
        for _ in 0..num_instructions {
            let program_id_index = reader.u8()?;
            let n = reader.compact_u16()? as usize;
            let account_indices = reader.take(n)?.to_vec();
            let len = reader.compact_u16()? as usize;
            let data = reader.take(len)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                account_indices,
                data,
            });
        }

        if reader.pos != bytes.len() {
            return Err(SolError::SerializationError(format!(
                "{} trailing bytes after message",
                bytes.len() - reader.pos
            )));
        }

        let message = Self {
            account_keys,
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            recent_blockhash,
            instructions,
        };
        message.check_indices()?;
        Ok(message)
    }

    /// Public keys expected to sign, in signature-slot order.
    pub fn signers(&self) -> &[Pubkey] {
        let n = (self.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    /// The fee payer (account index 0).
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.num_required_signatures as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let num_signed = self.num_required_signatures as usize;
        let total = self.account_keys.len();
        if index < num_signed {
            index < num_signed - self.num_readonly_signed as usize
        } else {
            index < total - self.num_readonly_unsigned as usize
        }
    }

    /// Expand compiled instructions back into account metas.
    pub fn decompile(&self) -> Result<Vec<SolInstruction>, SolError> {
        self.check_indices()?;
        let meta = |i: u8| SolAccountMeta {
            pubkey: self.account_keys[i as usize],
            is_signer: self.is_signer(i as usize),
            is_writable: self.is_writable(i as usize),
        };

        Ok(self
            .instructions
            .iter()
            .map(|ix| SolInstruction {
                program_id: self.account_keys[ix.program_id_index as usize],
                accounts: ix.account_indices.iter().map(|&i| meta(i)).collect(),
                data: ix.data.clone(),
            })
            .collect())
    }

    fn check_indices(&self) -> Result<(), SolError> {
        let n = self.account_keys.len();
        if (self.num_required_signatures as usize) > n
            || (self.num_readonly_signed as usize) > (self.num_required_signatures as usize)
            || (self.num_readonly_unsigned as usize) > n - self.num_required_signatures as usize
        {
            return Err(SolError::SerializationError(
                "message header is inconsistent with account count".into(),
            ));
        }
        let out_of_range = self.instructions.iter().any(|ix| {
            ix.program_id_index as usize >= n || ix.account_indices.iter().any(|&i| i as usize >= n)
        });
        if out_of_range {
            return Err(SolError::SerializationError(
                "instruction references an account index out of range".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signing envelope
// ---------------------------------------------------------------------------

/// No signatures yet.
#[derive(Debug)]
pub enum Unsigned {}
/// At least one, possibly all, signature slots filled.
#[derive(Debug)]
pub enum PartiallySigned {}
/// Every required signer has signed; ready for submission.
#[derive(Debug)]
pub enum FullySigned {}

/// A message plus one signature slot per required signer.
#[derive(Debug)]
pub struct Envelope<State> {
    message: Message,
    message_bytes: Vec<u8>,
    signatures: Vec<Option<[u8; SIGNATURE_LEN]>>,
    state: PhantomData<State>,
}

impl<State> Envelope<State> {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_bytes(&self) -> &[u8] {
        &self.message_bytes
    }

    /// Signature recorded for `signer`, if any.
    pub fn signature_of(&self, signer: &Pubkey) -> Option<[u8; SIGNATURE_LEN]> {
        let slot = self.message.signers().iter().position(|k| k == signer)?;
        self.signatures[slot]
    }

    /// Required signers whose slot is still empty.
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.message
            .signers()
            .iter()
            .zip(&self.signatures)
            .filter(|(_, sig)| sig.is_none())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Wire bytes; empty slots are written as 64 zero bytes.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(
            3 + self.signatures.len() * SIGNATURE_LEN + self.message_bytes.len(),
        );
        wire.extend_from_slice(&encode_compact_u16(self.signatures.len() as u16));
        for sig in &self.signatures {
            wire.extend_from_slice(&sig.unwrap_or([0u8; SIGNATURE_LEN]));
        }
        wire.extend_from_slice(&self.message_bytes);
        wire
    }

    /// Base64 of [`Envelope::to_wire`], the transport-safe hand-off form.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_wire())
    }

    fn sign_slot(&mut self, signer: &dyn TransactionSigner) -> Result<(), SolError> {
        let pubkey = signer.pubkey();
        let slot = self
            .message
            .signers()
            .iter()
            .position(|k| *k == pubkey)
            .ok_or_else(|| {
                SolError::SigningError(format!("{pubkey} not found in transaction signers"))
            })?;
        self.signatures[slot] = Some(signer.sign_message(&self.message_bytes));
        Ok(())
    }

    fn into_state<Next>(self) -> Envelope<Next> {
        Envelope {
            message: self.message,
            message_bytes: self.message_bytes,
            signatures: self.signatures,
            state: PhantomData,
        }
    }
}

impl Envelope<Unsigned> {
    pub fn new(message: Message) -> Self {
        let message_bytes = message.serialize();
        let slots = message.signers().len();
        Self {
            message,
            message_bytes,
            signatures: vec![None; slots],
            state: PhantomData,
        }
    }

    pub fn partial_sign(
        mut self,
        signer: &dyn TransactionSigner,
    ) -> Result<Envelope<PartiallySigned>, SolError> {
        self.sign_slot(signer)?;
        Ok(self.into_state())
    }
}

impl Envelope<PartiallySigned> {
    /// Add another signature.
    pub fn partial_sign(mut self, signer: &dyn TransactionSigner) -> Result<Self, SolError> {
        self.sign_slot(signer)?;
        Ok(self)
    }

    /// Promote to `FullySigned` once no slot is empty.
    pub fn finalize(self) -> Result<Envelope<FullySigned>, SolError> {
        let missing = self.missing_signers();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
            return Err(SolError::SigningError(format!(
                "missing signatures from {}",
                names.join(", ")
            )));
        }
        Ok(self.into_state())
    }

    /// Parse a wire transaction received from another party.
    ///
    /// All-zero signature slots are treated as unsigned.
    pub fn from_wire(raw: &[u8]) -> Result<Self, SolError> {
        let (num_sigs, compact_len) = decode_compact_u16(raw)?;
        if num_sigs == 0 {
            return Err(SolError::TransactionBuildError(
                "transaction has zero signatures".into(),
            ));
        }

        let sigs_end = compact_len + num_sigs as usize * SIGNATURE_LEN;
        if sigs_end > raw.len() {
            return Err(SolError::SerializationError(
                "transaction too short: signature slots exceed length".into(),
            ));
        }

        let message_bytes = raw[sigs_end..].to_vec();
        let message = Message::deserialize(&message_bytes)?;
        if message.num_required_signatures as usize != num_sigs as usize {
            return Err(SolError::SerializationError(format!(
                "{} signature slots for {} required signers",
                num_sigs, message.num_required_signatures
            )));
        }

        let signatures = raw[compact_len..sigs_end]
            .chunks_exact(SIGNATURE_LEN)
            .map(|chunk| {
                let mut sig = [0u8; SIGNATURE_LEN];
                sig.copy_from_slice(chunk);
                (sig != [0u8; SIGNATURE_LEN]).then_some(sig)
            })
            .collect();

        Ok(Self {
            message,
            message_bytes,
            signatures,
            state: PhantomData,
        })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, SolError> {
        let raw = BASE64
            .decode(encoded)
            .map_err(|e| SolError::SerializationError(format!("base64 decode failed: {e}")))?;
        Self::from_wire(&raw)
    }
}

impl Envelope<FullySigned> {
    /// The fee payer's signature, which doubles as the transaction id.
    pub fn signature(&self) -> [u8; SIGNATURE_LEN] {
        // `finalize` guarantees every slot is filled and there is at least one.
        self.signatures[0].unwrap_or([0u8; SIGNATURE_LEN])
    }

    /// Base58 transaction id.
    pub fn signature_base58(&self) -> String {
        bs58::encode(self.signature()).into_string()
    }
}

/// Add `signer`'s signature to a wire transaction built by someone else.
///
/// This is the end-user half of the two-party flow: locate the signer's slot,
/// sign the message and return the updated wire bytes.
pub fn cosign_wire_transaction(
    signer: &dyn TransactionSigner,
    raw_tx: &[u8],
) -> Result<Vec<u8>, SolError> {
    Ok(Envelope::from_wire(raw_tx)?.partial_sign(signer)?.to_wire())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SolError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SolError::SerializationError("transaction message too short".into()))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, SolError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn compact_u16(&mut self) -> Result<u16, SolError> {
        let (value, used) = decode_compact_u16(&self.data[self.pos..])?;
        self.pos += used;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::Keypair;

    fn transfer_like(from: Pubkey, to: Pubkey) -> SolInstruction {
        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&1_000u64.to_le_bytes());
        SolInstruction {
            program_id: SYSTEM_PROGRAM_ID,
            accounts: vec![SolAccountMeta::writable_signer(from), SolAccountMeta::writable(to)],
            data,
        }
    }

    // -- compact-u16 --------------------------------------------------------

    #[test]
    fn compact_u16_boundaries() {
        assert_eq!(encode_compact_u16(0), vec![0x00]);
        assert_eq!(encode_compact_u16(0x7f), vec![0x7f]);
        assert_eq!(encode_compact_u16(128), vec![0x80, 0x01]);
        assert_eq!(encode_compact_u16(16383), vec![0xff, 0x7f]);
        assert_eq!(encode_compact_u16(16384), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode_compact_u16(u16::MAX), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn decode_compact_u16_three_bytes() {
        let (val, len) = decode_compact_u16(&[0x80, 0x80, 0x01]).unwrap();
        assert_eq!(val, 16384);
        assert_eq!(len, 3);
    }

    #[test]
    fn decode_compact_u16_empty_input_fails() {
        assert!(decode_compact_u16(&[]).is_err());
    }

    #[test]
    fn decode_compact_u16_truncated_continuation_fails() {
        assert!(decode_compact_u16(&[0x80]).is_err());
    }

    // -- compilation ---------------------------------------------------------

    #[test]
    fn fee_payer_is_first_and_user_second() {
        let service = Pubkey::new([1; 32]);
        let user = Pubkey::new([2; 32]);
        let target = Pubkey::new([3; 32]);

        let msg = compile_message(&[transfer_like(user, target)], &service, &[0xAA; 32]).unwrap();

        assert_eq!(msg.account_keys[0], service);
        assert_eq!(msg.account_keys[1], user);
        assert_eq!(msg.num_required_signatures, 2);
        assert_eq!(msg.num_readonly_signed, 0);
        assert_eq!(msg.num_readonly_unsigned, 1); // system program
        assert_eq!(msg.signers(), &[service, user]);
    }

    #[test]
    fn duplicate_accounts_are_merged() {
        let key = Pubkey::new([0xAA; 32]);
        let msg = compile_message(&[transfer_like(key, key)], &key, &[0; 32]).unwrap();

        // key (signer+writable), system program (read-only).
        assert_eq!(msg.account_keys.len(), 2);
        assert_eq!(msg.num_required_signatures, 1);
    }

    #[test]
    fn serialized_message_contains_blockhash() {
        let from = Pubkey::new([1; 32]);
        let to = Pubkey::new([2; 32]);
        let blockhash = [0xCC; 32];
        let msg = compile_message(&[transfer_like(from, to)], &from, &blockhash).unwrap();
        let bytes = msg.serialize();

        let offset = 3 + 1 + 32 * msg.account_keys.len();
        assert_eq!(&bytes[offset..offset + 32], &blockhash);
    }

    #[test]
    fn message_serialize_deserialize_is_identity() {
        let service = Pubkey::new([1; 32]);
        let user = Pubkey::new([2; 32]);
        let target = Pubkey::new([3; 32]);
        let msg = compile_message(&[transfer_like(user, target)], &service, &[9; 32]).unwrap();

        let parsed = Message::deserialize(&msg.serialize()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn decompile_restores_account_roles() {
        let service = Pubkey::new([1; 32]);
        let user = Pubkey::new([2; 32]);
        let target = Pubkey::new([3; 32]);
        let ix = transfer_like(user, target);
        let msg = compile_message(&[ix.clone()], &service, &[9; 32]).unwrap();

        let decompiled = msg.decompile().unwrap();
        assert_eq!(decompiled, vec![ix]);
    }

    #[test]
    fn deserialize_rejects_truncated_message() {
        let from = Pubkey::new([1; 32]);
        let msg = compile_message(&[transfer_like(from, Pubkey::new([2; 32]))], &from, &[0; 32])
            .unwrap();
        let bytes = msg.serialize();
        assert!(Message::deserialize(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn deserialize_rejects_versioned_prefix() {
        let err = Message::deserialize(&[0x80, 1, 0, 0]).unwrap_err();
        assert!(err.to_string().contains("versioned"));
    }

    // -- envelope ------------------------------------------------------------

    #[test]
    fn partial_signature_leaves_user_slot_empty() {
        let service = Keypair::from_seed(&[0x11; 32]);
        let user = Keypair::from_seed(&[0x22; 32]);
        let msg = compile_message(
            &[transfer_like(user.pubkey(), Pubkey::new([3; 32]))],
            &service.pubkey(),
            &[0xCC; 32],
        )
        .unwrap();

        let envelope = Envelope::new(msg).partial_sign(&service).unwrap();

        assert!(envelope.signature_of(&service.pubkey()).is_some());
        assert!(envelope.signature_of(&user.pubkey()).is_none());
        assert_eq!(envelope.missing_signers(), vec![user.pubkey()]);

        let wire = envelope.to_wire();
        assert_eq!(wire[0], 2);
        assert_eq!(&wire[65..129], &[0u8; 64]);
    }

    #[test]
    fn finalize_fails_while_a_signature_is_missing() {
        let service = Keypair::from_seed(&[0x11; 32]);
        let user = Keypair::from_seed(&[0x22; 32]);
        let msg = compile_message(
            &[transfer_like(user.pubkey(), Pubkey::new([3; 32]))],
            &service.pubkey(),
            &[0xCC; 32],
        )
        .unwrap();

        let err = Envelope::new(msg)
            .partial_sign(&service)
            .unwrap()
            .finalize()
            .unwrap_err();
        assert!(err.to_string().contains(&user.pubkey().to_string()));
    }

    #[test]
    fn sole_signer_can_finalize() {
        use ed25519_dalek::{Signature, VerifyingKey};

        let service = Keypair::from_seed(&[0x42; 32]);
        let msg = compile_message(
            &[transfer_like(service.pubkey(), Pubkey::new([3; 32]))],
            &service.pubkey(),
            &[0xCC; 32],
        )
        .unwrap();

        let signed = Envelope::new(msg)
            .partial_sign(&service)
            .unwrap()
            .finalize()
            .unwrap();

        let vk = VerifyingKey::from_bytes(service.pubkey().as_bytes()).unwrap();
        let sig = Signature::from_bytes(&signed.signature());
        assert!(vk.verify_strict(signed.message_bytes(), &sig).is_ok());
        assert_eq!(
            signed.signature_base58(),
            bs58::encode(signed.signature()).into_string()
        );
    }

    #[test]
    fn signer_outside_message_is_rejected() {
        let service = Keypair::from_seed(&[0x11; 32]);
        let stranger = Keypair::from_seed(&[0x99; 32]);
        let msg = compile_message(&[], &service.pubkey(), &[0; 32]).unwrap();

        let err = Envelope::new(msg).partial_sign(&stranger).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn cosigning_completes_the_envelope() {
        let service = Keypair::from_seed(&[0x11; 32]);
        let user = Keypair::from_seed(&[0x22; 32]);
        let msg = compile_message(
            &[transfer_like(user.pubkey(), Pubkey::new([3; 32]))],
            &service.pubkey(),
            &[0xCC; 32],
        )
        .unwrap();
        let partial = Envelope::new(msg).partial_sign(&service).unwrap();

        let completed = cosign_wire_transaction(&user, &partial.to_wire()).unwrap();

        // Message portion is untouched, service signature preserved.
        assert_eq!(&completed[129..], partial.message_bytes());
        assert_eq!(&completed[1..65], &partial.to_wire()[1..65]);

        let envelope = Envelope::from_wire(&completed).unwrap();
        assert!(envelope.missing_signers().is_empty());
        assert!(envelope.finalize().is_ok());
    }

    #[test]
    fn base64_roundtrip_of_partial_envelope() {
        let service = Keypair::from_seed(&[0x11; 32]);
        let user = Pubkey::new([0x22; 32]);
        let msg = compile_message(
            &[transfer_like(user, Pubkey::new([3; 32]))],
            &service.pubkey(),
            &[0xCC; 32],
        )
        .unwrap();
        let partial = Envelope::new(msg.clone()).partial_sign(&service).unwrap();

        let parsed = Envelope::from_base64(&partial.to_base64()).unwrap();
        assert_eq!(parsed.message(), &msg);
        assert_eq!(parsed.missing_signers(), vec![user]);
    }

    #[test]
    fn from_wire_rejects_zero_signatures() {
        let err = Envelope::from_wire(&[0x00, 0x01, 0x00, 0x00]).unwrap_err();
        assert!(err.to_string().contains("zero signatures"));
    }

    #[test]
    fn from_wire_rejects_trailing_bytes() {
        let service = Keypair::from_seed(&[0x11; 32]);
        let msg = compile_message(
            &[transfer_like(service.pubkey(), Pubkey::new([3; 32]))],
            &service.pubkey(),
            &[0xCC; 32],
        )
        .unwrap();
        let mut wire = Envelope::new(msg).partial_sign(&service).unwrap().to_wire();
        wire.extend_from_slice(&[0xde, 0xad]);

        let err = Envelope::from_wire(&wire).unwrap_err();
        assert!(err.to_string().contains("2 trailing bytes"));
    }

    #[test]
    fn from_wire_rejects_truncated_input() {
        assert!(Envelope::from_wire(&[0x01]).is_err());
        assert!(Envelope::from_wire(&[]).is_err());
    }
}
