// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::io;

use thiserror::Error;

use crate::{ExceptionResponse, FunctionCode, Response};

/// Protocol or transport errors.
///
/// Device exceptions are not errors at this level, they are delivered
/// as the inner result of [`crate::Result`].
#[derive(Debug, Error)]
pub enum Error {
    /// A protocol error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A transport error, e.g. a closed connection.
    #[error(transparent)]
    Transport(#[from] io::Error),

    /// No valid response after all retries.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// _Protocol_ errors.
///
/// Errors that are caused by a violation of the protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The headers of the request and response do not match.
    #[error("mismatching headers: {message} {result:?}")]
    HeaderMismatch {
        message: String,
        result: Result<Response, ExceptionResponse>,
    },

    /// The function codes of the request and response do not match.
    #[error("mismatching function codes: {request} {result:?}")]
    FunctionCodeMismatch {
        request: FunctionCode,
        result: Result<Response, ExceptionResponse>,
    },

    /// An integer cannot be represented as a 16 bit register.
    #[error("register value out of range: {value}")]
    RegisterValueOutOfRange { value: i64 },
}

/// Why a single attempt of a transaction failed.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    /// No valid response arrived before the deadline.
    #[error("timeout")]
    Timeout,

    /// A response arrived that does not belong to the request.
    #[error(transparent)]
    Mismatch(ProtocolError),

    /// The transport failed while sending or receiving.
    #[error(transparent)]
    Transport(io::Error),
}

/// A transaction gave up after exhausting all retries.
#[derive(Debug, Error)]
#[error("transaction failed after {attempts} attempt(s): {last_failure}")]
pub struct TransactionError {
    /// Number of times the request has been sent.
    pub attempts: usize,
    pub last_failure: AttemptFailure,
}
