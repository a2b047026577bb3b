// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execute this test only if the `rtu` and `server` features are selected.

#![cfg(all(feature = "rtu", feature = "server"))]

mod exception;

use tokio::io::duplex;
use tokio_fieldbus::{
    client, server::serial::serve_rtu, transport::serial::SerialConfig, Slave,
};

use crate::exception::{check_client_context, TestService};

#[tokio::test]
async fn all_exceptions() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Given
    let serial = SerialConfig::new(115_200);
    let (slave_line, master_line) = duplex(1024);
    let server = tokio::spawn(serve_rtu(slave_line, serial, TestService));

    // When
    let ctx = client::rtu::attach_slave(master_line, serial, Slave(1));

    // Then
    check_client_context(ctx).await;
    server.abort();
}
