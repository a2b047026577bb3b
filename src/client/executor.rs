// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response transactions with timeout and retries

use std::{fmt, io, time::Duration};

use async_trait::async_trait;
use tokio::time::{sleep, timeout_at, Instant};

use crate::{
    codec::request_to_bytes,
    error::{AttemptFailure, ProtocolError, TransactionError},
    frame::{
        verify_response_header, Adu, ExceptionCode, ExceptionResponse, FunctionCode, Header,
        Request, Response, ResponsePdu, TransactionId, UnitId,
    },
    slave::{Slave, SlaveContext},
    transport::{is_fatal, Transport},
    Error, Result,
};

/// The well-known port of TCP and UDP slaves.
pub const DEFAULT_PORT: u16 = 502;

/// Transaction ids wrap back to 0 after this value by default.
pub const MAX_TRANSACTION_ID: TransactionId = 32_767;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3_000);

const DEFAULT_RETRIES: usize = 5;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Settings of the transaction executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long to wait for a matching response per attempt.
    pub timeout: Duration,
    /// Number of resends after the first attempt failed.
    pub retries: usize,
    /// Pause before each resend.
    pub retry_delay: Duration,
    /// Reject responses with foreign transaction ids, unit ids or
    /// function codes.
    pub validate_responses: bool,
    /// Reconnect the transport before each resend.
    pub reconnect_on_retry: bool,
    pub max_transaction_id: TransactionId,
}

impl ClientConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_validate_responses(mut self, validate_responses: bool) -> Self {
        self.validate_responses = validate_responses;
        self
    }

    #[must_use]
    pub fn with_reconnect_on_retry(mut self, reconnect_on_retry: bool) -> Self {
        self.reconnect_on_retry = reconnect_on_retry;
        self
    }

    #[must_use]
    pub fn with_max_transaction_id(mut self, max_transaction_id: TransactionId) -> Self {
        self.max_transaction_id = max_transaction_id;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            validate_responses: true,
            reconnect_on_retry: false,
            max_transaction_id: MAX_TRANSACTION_ID,
        }
    }
}

/// Progress of a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    /// The request is on the wire.
    Sent,
    /// A matching response has been received.
    Received,
    /// The last attempt ended without a valid response.
    TimedOut,
    Done,
}

/// One request/response pair in flight.
#[derive(Debug)]
struct Transaction {
    request: Adu,
    function: FunctionCode,
    attempts: usize,
    state: TransactionState,
}

impl Transaction {
    fn transition(&mut self, state: TransactionState) {
        log::trace!(
            "Transaction {}: {:?} -> {state:?}",
            self.request.hdr.transaction_id,
            self.state
        );
        self.state = state;
    }
}

type ResponseResult = std::result::Result<Response, ExceptionResponse>;

type AttemptResult =
    std::result::Result<std::result::Result<Response, ExceptionCode>, AttemptFailure>;

/// Drives requests through a [`Transport`].
///
/// Transactions are strictly sequential, one executor owns one link.
pub struct Executor<T> {
    transport: T,
    config: ClientConfig,
    unit_id: UnitId,
    next_transaction_id: TransactionId,
}

impl<T> fmt::Debug for Executor<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("unit_id", &self.unit_id)
            .finish_non_exhaustive()
    }
}

impl<T> Executor<T>
where
    T: Transport,
{
    pub fn new(transport: T, slave: Slave, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            unit_id: slave.into(),
            next_transaction_id: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        let transaction_id = self.next_transaction_id;
        self.next_transaction_id = if transaction_id >= self.config.max_transaction_id {
            0
        } else {
            transaction_id + 1
        };
        transaction_id
    }

    fn new_transaction(&mut self, request: &Request<'_>) -> io::Result<Transaction> {
        let pdu = request_to_bytes(request)?;
        let hdr = Header {
            transaction_id: self.next_transaction_id(),
            unit_id: self.unit_id,
        };
        Ok(Transaction {
            request: Adu { hdr, pdu },
            function: request.function_code(),
            attempts: 0,
            state: TransactionState::Idle,
        })
    }

    /// Send a request to all slaves without waiting for a response.
    pub async fn broadcast(&mut self, request: Request<'_>) -> std::result::Result<(), Error> {
        let mut transaction = self.new_transaction(&request)?;
        transaction.request.hdr.unit_id = Slave::broadcast().into();
        log::debug!("Broadcast {request:?}");
        self.transport.write_adu(transaction.request).await?;
        Ok(())
    }

    /// Execute a request and wait for the matching response.
    ///
    /// Broadcast requests on serial links are never answered, use
    /// [`Self::broadcast`] instead. Headered framings treat unit 0 as an
    /// ordinary unit id.
    pub async fn execute(&mut self, request: Request<'_>) -> Result<Response> {
        if self.transport.framing().is_headless() && Slave(self.unit_id).is_broadcast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "broadcast requests are not answered",
            )
            .into());
        }
        log::debug!("Call {request:?}");
        let mut transaction = self.new_transaction(&request)?;
        loop {
            transaction.attempts += 1;
            let failure = match self.attempt(&mut transaction).await {
                Ok(result) => {
                    transaction.transition(TransactionState::Done);
                    return Ok(result);
                }
                Err(AttemptFailure::Transport(err))
                    if is_fatal(&err) && !self.config.reconnect_on_retry =>
                {
                    transaction.transition(TransactionState::Done);
                    return Err(err.into());
                }
                Err(failure) => failure,
            };
            transaction.transition(TransactionState::TimedOut);
            if transaction.attempts > self.config.retries {
                log::warn!(
                    "Giving up transaction {} after {} attempt(s): {failure}",
                    transaction.request.hdr.transaction_id,
                    transaction.attempts
                );
                transaction.transition(TransactionState::Done);
                return Err(TransactionError {
                    attempts: transaction.attempts,
                    last_failure: failure,
                }
                .into());
            }
            log::debug!(
                "Attempt {} of transaction {} failed: {failure}",
                transaction.attempts,
                transaction.request.hdr.transaction_id
            );
            sleep(self.config.retry_delay).await;
            if self.config.reconnect_on_retry {
                if let Err(err) = self.transport.reconnect().await {
                    log::warn!("Failed to reconnect: {err}");
                }
            }
        }
    }

    async fn attempt(&mut self, transaction: &mut Transaction) -> AttemptResult {
        let deadline = Instant::now() + self.config.timeout;
        match timeout_at(deadline, self.transport.write_adu(transaction.request.clone())).await {
            Ok(Ok(())) => transaction.transition(TransactionState::Sent),
            Ok(Err(err)) => return Err(AttemptFailure::Transport(err)),
            Err(_) => return Err(AttemptFailure::Timeout),
        }
        loop {
            let adu = match timeout_at(deadline, self.transport.read_adu()).await {
                Ok(Ok(Some(adu))) => adu,
                // Malformed frame, keep waiting.
                Ok(Ok(None)) => continue,
                Ok(Err(err)) => return Err(AttemptFailure::Transport(err)),
                Err(_) => return Err(AttemptFailure::Timeout),
            };
            let result = match ResponsePdu::try_from(adu.pdu) {
                Ok(ResponsePdu(result)) => result,
                Err(err) => {
                    log::debug!("Skipping undecodable response: {err}");
                    continue;
                }
            };
            let result = if self.config.validate_responses {
                self.verify_response(transaction, &adu.hdr, result)
                    .map_err(AttemptFailure::Mismatch)?
            } else {
                result
            };
            transaction.transition(TransactionState::Received);
            return Ok(result.map_err(|err| err.exception));
        }
    }

    fn verify_response(
        &self,
        transaction: &Transaction,
        rsp_hdr: &Header,
        result: ResponseResult,
    ) -> std::result::Result<ResponseResult, ProtocolError> {
        if let Err(message) =
            verify_response_header(self.transport.framing(), &transaction.request.hdr, rsp_hdr)
        {
            return Err(ProtocolError::HeaderMismatch { message, result });
        }
        let function = match &result {
            Ok(response) => response.function_code(),
            Err(exception) => exception.function,
        };
        if function != transaction.function {
            return Err(ProtocolError::FunctionCodeMismatch {
                request: transaction.function,
                result,
            });
        }
        Ok(result)
    }
}

impl<T> SlaveContext for Executor<T> {
    fn set_slave(&mut self, slave: Slave) {
        self.unit_id = slave.into();
    }
}

#[async_trait]
impl<T> super::Client for Executor<T>
where
    T: Transport,
{
    async fn call(&mut self, request: Request<'_>) -> Result<Response> {
        self.execute(request).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.transport.disconnect().await
    }
}
