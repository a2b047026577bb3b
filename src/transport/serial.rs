// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line transports (RTU and ASCII)
//!
//! RTU frames are delimited by line silence only. The timing rules are
//! implemented by the I/O free [`FrameAssembler`]:
//!
//! - a silence of at least 3.5 character times ends a frame,
//! - a gap of more than 1.5 character times inside a frame corrupts it.
//!
//! One character is 11 bits on the wire. Above 19200 baud fixed values
//! of 750 µs and 1750 µs are used instead.

use std::{fmt, io, time::Duration};

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt as _, StreamExt as _};
use smallvec::SmallVec;
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _},
    time::{sleep_until, timeout_at, Instant},
};
use tokio_util::codec::Framed;

use crate::{
    codec::{
        ascii::{self, AsciiCodec},
        rtu::{decode_frame, encode_frame, MAX_FRAME_LEN},
        DecodedFrame,
    },
    frame::{Adu, Framing},
};

use super::{ignore_closed, Connector, Transport};

const BITS_PER_CHAR: u64 = 11;

const FIXED_TIMING_BAUD_RATE: u32 = 19_200;

const FIXED_T1_5: Duration = Duration::from_micros(750);

const FIXED_T3_5: Duration = Duration::from_micros(1_750);

/// Lower bound of the pause between two messages on the bus.
pub const MIN_INTER_MESSAGE_DELAY: Duration = Duration::from_millis(2);

/// Line parameters that affect framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Overrides the computed pause between messages.
    pub inter_message_delay: Option<Duration>,
}

impl SerialConfig {
    #[must_use]
    pub const fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            inter_message_delay: None,
        }
    }

    #[must_use]
    pub const fn with_inter_message_delay(mut self, delay: Duration) -> Self {
        self.inter_message_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn timing(&self) -> SerialTiming {
        let timing = SerialTiming::new(self.baud_rate);
        match self.inter_message_delay {
            Some(delay) => SerialTiming {
                inter_message_delay: delay,
                ..timing
            },
            None => timing,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new(FIXED_TIMING_BAUD_RATE)
    }
}

/// Derived character timing of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialTiming {
    pub char_time: Duration,
    /// Maximum gap between two characters of a frame.
    pub t1_5: Duration,
    /// Minimum silence between two frames.
    pub t3_5: Duration,
    pub inter_message_delay: Duration,
}

impl SerialTiming {
    #[must_use]
    pub fn new(baud_rate: u32) -> Self {
        let char_time =
            Duration::from_nanos(BITS_PER_CHAR * 1_000_000_000 / u64::from(baud_rate.max(1)));
        let (t1_5, t3_5) = if baud_rate > FIXED_TIMING_BAUD_RATE {
            (FIXED_T1_5, FIXED_T3_5)
        } else {
            (char_time * 3 / 2, char_time * 7 / 2)
        };
        Self {
            char_time,
            t1_5,
            t3_5,
            inter_message_delay: t3_5.max(MIN_INTER_MESSAGE_DELAY),
        }
    }

    /// Time needed to put `len` characters on the wire.
    #[must_use]
    pub fn transmission_time(&self, len: usize) -> Duration {
        self.char_time * u32::try_from(len).unwrap_or(u32::MAX)
    }
}

/// State of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Waiting for the first character of a frame.
    Idle,
    /// Collecting characters.
    Receiving,
    /// A complete frame is ready to be taken.
    FrameComplete,
    /// The current frame is corrupt, waiting for the line to calm down.
    FrameError,
}

/// Assembles RTU frames from timestamped characters.
///
/// The caller has to [`poll`](Self::poll) the assembler with the current
/// time before pushing newly received characters, and whenever the
/// [deadline](Self::deadline) passes without any input.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    timing: SerialTiming,
    state: FrameState,
    buf: SmallVec<[u8; MAX_FRAME_LEN]>,
    last_activity: Option<Instant>,
}

impl FrameAssembler {
    #[must_use]
    pub fn new(timing: SerialTiming) -> Self {
        Self {
            timing,
            state: FrameState::Idle,
            buf: SmallVec::new(),
            last_activity: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    fn silence(&self, now: Instant) -> Duration {
        self.last_activity
            .map_or(Duration::MAX, |last| now.saturating_duration_since(last))
    }

    /// Feed one received character.
    pub fn push(&mut self, byte: u8, now: Instant) -> FrameState {
        let silence = self.silence(now);
        match self.state {
            FrameState::Idle | FrameState::FrameComplete => {
                if self.state == FrameState::FrameComplete {
                    log::debug!("Dropping unclaimed frame of {} byte(s)", self.buf.len());
                }
                self.buf.clear();
                self.buf.push(byte);
                self.state = FrameState::Receiving;
            }
            FrameState::Receiving => {
                if silence > self.timing.t1_5 {
                    log::debug!(
                        "Inter-character gap of {silence:?} after {} byte(s)",
                        self.buf.len()
                    );
                    self.buf.clear();
                    self.state = FrameState::FrameError;
                } else if self.buf.len() >= MAX_FRAME_LEN {
                    log::debug!("Frame exceeds {MAX_FRAME_LEN} bytes");
                    self.buf.clear();
                    self.state = FrameState::FrameError;
                } else {
                    self.buf.push(byte);
                }
            }
            FrameState::FrameError => {
                // Discarded, the silence timer restarts.
            }
        }
        self.last_activity = Some(now);
        self.state
    }

    /// Advance the timers without receiving a character.
    pub fn poll(&mut self, now: Instant) -> FrameState {
        let silence = self.silence(now);
        match self.state {
            FrameState::Receiving if silence >= self.timing.t3_5 => {
                self.state = FrameState::FrameComplete;
            }
            FrameState::FrameError if silence >= self.timing.t3_5 => {
                self.state = FrameState::Idle;
            }
            _ => (),
        }
        self.state
    }

    /// The next point in time at which [`poll`](Self::poll) may change the state.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            FrameState::Receiving | FrameState::FrameError => {
                self.last_activity.map(|last| last + self.timing.t3_5)
            }
            FrameState::Idle | FrameState::FrameComplete => None,
        }
    }

    /// Take the completed frame and return to [`FrameState::Idle`].
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        if self.state != FrameState::FrameComplete {
            return None;
        }
        self.state = FrameState::Idle;
        let frame = self.buf.to_vec();
        self.buf.clear();
        Some(frame)
    }
}

/// Waits until the bus has been quiet for the inter-message delay.
#[derive(Debug, Clone, Copy)]
struct BusGuard {
    delay: Duration,
    idle_since: Option<Instant>,
}

impl BusGuard {
    const fn new(delay: Duration) -> Self {
        Self {
            delay,
            idle_since: None,
        }
    }

    async fn wait(&self) {
        if let Some(idle_since) = self.idle_since {
            sleep_until(idle_since + self.delay).await;
        }
    }

    fn mark(&mut self, idle_since: Instant) {
        self.idle_since = Some(idle_since);
    }
}

/// RTU framing over a serial byte stream.
pub struct RtuTransport<T> {
    stream: T,
    timing: SerialTiming,
    assembler: FrameAssembler,
    pending: BytesMut,
    bus: BusGuard,
    connector: Option<Connector<T>>,
}

impl<T> fmt::Debug for RtuTransport<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtuTransport")
            .field("stream", &self.stream)
            .field("timing", &self.timing)
            .field("state", &self.assembler.state())
            .field("reconnectable", &self.connector.is_some())
            .finish()
    }
}

impl<T> RtuTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T, config: SerialConfig) -> Self {
        let timing = config.timing();
        Self {
            stream,
            timing,
            assembler: FrameAssembler::new(timing),
            pending: BytesMut::new(),
            bus: BusGuard::new(timing.inter_message_delay),
            connector: None,
        }
    }

    /// Enable [`Transport::reconnect`], e.g. by reopening the port.
    #[must_use]
    pub fn with_connector(mut self, connector: Connector<T>) -> Self {
        self.connector = Some(connector);
        self
    }

    async fn read_frame(&mut self) -> io::Result<Vec<u8>> {
        loop {
            let now = Instant::now();
            if self.assembler.poll(now) == FrameState::FrameComplete {
                if let Some(frame) = self.assembler.take_frame() {
                    return Ok(frame);
                }
            }
            if !self.pending.is_empty() {
                for byte in self.pending.split() {
                    self.assembler.push(byte, now);
                }
                continue;
            }
            let read = self.stream.read_buf(&mut self.pending);
            let len = match self.assembler.deadline() {
                Some(deadline) => match timeout_at(deadline, read).await {
                    Ok(len) => len?,
                    // Silence, let the assembler advance.
                    Err(_) => continue,
                },
                None => read.await?,
            };
            if len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial stream closed",
                ));
            }
        }
    }
}

#[cfg(feature = "serial")]
impl RtuTransport<tokio_serial::SerialStream> {
    /// Open the serial port at `path`, reopening it on reconnect.
    pub fn open(path: &str, config: SerialConfig) -> io::Result<Self> {
        let builder = tokio_serial::new(path, config.baud_rate);
        let stream = tokio_serial::SerialStream::open(&builder)?;
        let connector: Connector<tokio_serial::SerialStream> = Box::new(move || {
            let builder = builder.clone();
            Box::pin(async move { Ok(tokio_serial::SerialStream::open(&builder)?) })
        });
        Ok(Self::new(stream, config).with_connector(connector))
    }
}

#[async_trait]
impl<T> Transport for RtuTransport<T>
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin,
{
    fn framing(&self) -> Framing {
        Framing::Rtu
    }

    async fn write_adu(&mut self, adu: Adu) -> io::Result<()> {
        let mut buf = BytesMut::new();
        encode_frame(&adu, &mut buf);
        self.bus.wait().await;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        self.bus
            .mark(Instant::now() + self.timing.transmission_time(buf.len()));
        Ok(())
    }

    async fn read_adu(&mut self) -> io::Result<Option<Adu>> {
        let frame = self.read_frame().await?;
        self.bus.mark(Instant::now());
        match decode_frame(&frame) {
            DecodedFrame::Frame(adu) => Ok(Some(adu)),
            DecodedFrame::Discarded(reason) => {
                log::debug!("Discarded RTU frame: {reason}");
                Ok(None)
            }
        }
    }

    async fn reconnect(&mut self) -> io::Result<()> {
        let Some(connector) = self.connector.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no connector configured",
            ));
        };
        self.stream = connector().await?;
        self.assembler = FrameAssembler::new(self.timing);
        self.pending.clear();
        log::debug!("Reopened RTU transport");
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        ignore_closed(self.stream.shutdown().await)
    }
}

/// ASCII framing over a serial byte stream.
pub struct AsciiTransport<T> {
    framed: Framed<T, AsciiCodec>,
    timing: SerialTiming,
    bus: BusGuard,
    connector: Option<Connector<T>>,
}

impl<T> fmt::Debug for AsciiTransport<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsciiTransport")
            .field("stream", self.framed.get_ref())
            .field("reconnectable", &self.connector.is_some())
            .finish()
    }
}

impl<T> AsciiTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T, config: SerialConfig) -> Self {
        let timing = config.timing();
        Self {
            framed: Framed::new(stream, AsciiCodec),
            timing,
            bus: BusGuard::new(timing.inter_message_delay),
            connector: None,
        }
    }

    /// Enable [`Transport::reconnect`], e.g. by reopening the port.
    #[must_use]
    pub fn with_connector(mut self, connector: Connector<T>) -> Self {
        self.connector = Some(connector);
        self
    }
}

#[cfg(feature = "serial")]
impl AsciiTransport<tokio_serial::SerialStream> {
    /// Open the serial port at `path`, reopening it on reconnect.
    pub fn open(path: &str, config: SerialConfig) -> io::Result<Self> {
        let builder = tokio_serial::new(path, config.baud_rate);
        let stream = tokio_serial::SerialStream::open(&builder)?;
        let connector: Connector<tokio_serial::SerialStream> = Box::new(move || {
            let builder = builder.clone();
            Box::pin(async move { Ok(tokio_serial::SerialStream::open(&builder)?) })
        });
        Ok(Self::new(stream, config).with_connector(connector))
    }
}

#[async_trait]
impl<T> Transport for AsciiTransport<T>
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin,
{
    fn framing(&self) -> Framing {
        Framing::Ascii
    }

    async fn write_adu(&mut self, adu: Adu) -> io::Result<()> {
        let frame_len = ascii::frame_len(adu.pdu.len());
        self.bus.wait().await;
        self.framed.send(adu).await?;
        self.bus
            .mark(Instant::now() + self.timing.transmission_time(frame_len));
        Ok(())
    }

    async fn read_adu(&mut self) -> io::Result<Option<Adu>> {
        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial stream closed",
                ))
            }
        };
        self.bus.mark(Instant::now());
        match frame {
            DecodedFrame::Frame(adu) => Ok(Some(adu)),
            DecodedFrame::Discarded(reason) => {
                log::debug!("Discarded ASCII frame: {reason}");
                Ok(None)
            }
        }
    }

    async fn reconnect(&mut self) -> io::Result<()> {
        let Some(connector) = self.connector.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no connector configured",
            ));
        };
        let stream = connector().await?;
        self.framed = Framed::new(stream, AsciiCodec);
        log::debug!("Reopened ASCII transport");
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        ignore_closed(self.framed.get_mut().shutdown().await)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncWriteExt as _};

    use crate::frame::Header;

    use super::*;

    fn timing_9600() -> SerialTiming {
        SerialTiming::new(9_600)
    }

    #[test]
    fn character_timing() {
        let timing = SerialTiming::new(9_600);
        assert_eq!(timing.char_time, Duration::from_nanos(1_145_833));
        assert_eq!(timing.t1_5, Duration::from_nanos(1_718_749));
        assert_eq!(timing.t3_5, Duration::from_nanos(4_010_415));
        assert_eq!(timing.inter_message_delay, timing.t3_5);

        let timing = SerialTiming::new(115_200);
        assert_eq!(timing.t1_5, Duration::from_micros(750));
        assert_eq!(timing.t3_5, Duration::from_micros(1_750));
        assert_eq!(timing.inter_message_delay, MIN_INTER_MESSAGE_DELAY);
    }

    #[test]
    fn inter_message_delay_override() {
        let config = SerialConfig::new(9_600).with_inter_message_delay(Duration::from_millis(50));
        assert_eq!(config.timing().inter_message_delay, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_idle_bus() {
        let mut bus = BusGuard::new(Duration::from_millis(5));
        let start = Instant::now();
        bus.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        bus.mark(Instant::now());
        bus.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn assemble_frame_after_silence() {
        let timing = timing_9600();
        let mut assembler = FrameAssembler::new(timing);
        let t0 = Instant::now();

        assert_eq!(assembler.poll(t0), FrameState::Idle);
        let mut now = t0;
        for byte in [0x01, 0x03, 0x02, 0x00, 0xFB, 0xF9, 0xC7] {
            assert_eq!(assembler.push(byte, now), FrameState::Receiving);
            now += timing.char_time;
        }
        let last = now - timing.char_time;
        assert_eq!(assembler.deadline(), Some(last + timing.t3_5));

        // Not quiet long enough yet
        assert_eq!(
            assembler.poll(last + timing.t3_5 - Duration::from_micros(1)),
            FrameState::Receiving
        );
        assert!(assembler.take_frame().is_none());

        assert_eq!(
            assembler.poll(last + timing.t3_5),
            FrameState::FrameComplete
        );
        assert_eq!(
            assembler.take_frame().unwrap(),
            vec![0x01, 0x03, 0x02, 0x00, 0xFB, 0xF9, 0xC7]
        );
        assert_eq!(assembler.state(), FrameState::Idle);
    }

    #[test]
    fn gap_inside_frame_is_a_framing_error() {
        let timing = timing_9600();
        let mut assembler = FrameAssembler::new(timing);
        let t0 = Instant::now();

        assembler.push(0x01, t0);
        assembler.push(0x03, t0 + timing.char_time);
        // Gap between t1.5 and t3.5
        let late = t0 + timing.char_time + timing.t1_5 + Duration::from_micros(100);
        assert_eq!(assembler.poll(late), FrameState::Receiving);
        assert_eq!(assembler.push(0x02, late), FrameState::FrameError);

        // Further characters keep the error alive
        let next = late + timing.char_time;
        assert_eq!(assembler.push(0x00, next), FrameState::FrameError);
        assert_eq!(assembler.deadline(), Some(next + timing.t3_5));

        // The partial frame is never delivered
        assert_eq!(assembler.poll(next + timing.t3_5), FrameState::Idle);
        assert!(assembler.take_frame().is_none());

        // The next frame is received normally
        let t1 = next + timing.t3_5;
        assert_eq!(assembler.push(0x11, t1), FrameState::Receiving);
        assert_eq!(
            assembler.poll(t1 + timing.t3_5),
            FrameState::FrameComplete
        );
        assert_eq!(assembler.take_frame().unwrap(), vec![0x11]);
    }

    #[test]
    fn oversized_frame_is_a_framing_error() {
        let timing = SerialTiming::new(115_200);
        let mut assembler = FrameAssembler::new(timing);
        let now = Instant::now();
        for _ in 0..MAX_FRAME_LEN {
            assert_eq!(assembler.push(0xAA, now), FrameState::Receiving);
        }
        assert_eq!(assembler.push(0xAA, now), FrameState::FrameError);
    }

    #[tokio::test]
    async fn rtu_round_trip_over_duplex() {
        let config = SerialConfig::new(115_200);
        let (master, slave) = duplex(256);
        let mut master = RtuTransport::new(master, config);
        let mut slave = RtuTransport::new(slave, config);

        let request = Adu {
            hdr: Header {
                transaction_id: 0,
                unit_id: 0x01,
            },
            pdu: Bytes::from_static(&[0x03, 0x00, 0x00, 0x00, 0x01]),
        };
        master.write_adu(request.clone()).await.unwrap();
        assert_eq!(slave.read_adu().await.unwrap(), Some(request));

        let response = Adu {
            hdr: Header {
                transaction_id: 0,
                unit_id: 0x01,
            },
            pdu: Bytes::from_static(&[0x03, 0x02, 0x00, 0xFB]),
        };
        slave.write_adu(response.clone()).await.unwrap();
        assert_eq!(master.read_adu().await.unwrap(), Some(response));
    }

    #[tokio::test]
    async fn rtu_frame_with_invalid_crc_is_discarded() {
        let (master, mut line) = duplex(256);
        let mut master = RtuTransport::new(master, SerialConfig::new(115_200));
        line.write_all(&[0x01, 0x03, 0x02, 0x00, 0xFB, 0xF9, 0xC8])
            .await
            .unwrap();
        assert_eq!(master.read_adu().await.unwrap(), None);
    }

    #[tokio::test]
    async fn ascii_round_trip_over_duplex() {
        let config = SerialConfig::default();
        let (master, slave) = duplex(256);
        let mut master = AsciiTransport::new(master, config);
        let mut slave = AsciiTransport::new(slave, config);

        let request = Adu {
            hdr: Header {
                transaction_id: 0,
                unit_id: 0x11,
            },
            pdu: Bytes::from_static(&[0x03, 0x00, 0x6B, 0x00, 0x03]),
        };
        master.write_adu(request.clone()).await.unwrap();
        assert_eq!(slave.read_adu().await.unwrap(), Some(request));
    }

    #[tokio::test(start_paused = true)]
    async fn ascii_waits_for_the_frame_to_leave_the_line() {
        let config = SerialConfig::new(9_600);
        let timing = config.timing();
        let (master, _line) = duplex(256);
        let mut master = AsciiTransport::new(master, config);
        let request = Adu {
            hdr: Header {
                transaction_id: 0,
                unit_id: 0x11,
            },
            pdu: Bytes::from_static(&[0x03, 0x00, 0x6B, 0x00, 0x03]),
        };

        master.write_adu(request.clone()).await.unwrap();
        let sent = Instant::now();
        master.write_adu(request).await.unwrap();

        // ":1103006B00037E\r\n"
        let busy = timing.transmission_time(17) + timing.inter_message_delay;
        assert!(sent.elapsed() >= busy);
    }

    #[tokio::test]
    async fn closed_serial_stream() {
        let (master, line) = duplex(16);
        let mut master = RtuTransport::new(master, SerialConfig::default());
        drop(line);
        let err = master.read_adu().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
