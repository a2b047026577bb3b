// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A master and a slave sharing a process image over TCP.

#![cfg(all(feature = "tcp", feature = "server"))]

use std::{net::SocketAddr, sync::Arc};

use tokio_fieldbus::{
    client::{self, Context},
    image::ProcessImage,
    prelude::*,
    server::{
        tcp::{accept_tcp_connection, Server},
        ImageService,
    },
};

fn process_image() -> Arc<ProcessImage> {
    let image = Arc::new(ProcessImage::new());
    {
        let mut coils = image.coils_mut();
        for addr in 0..16 {
            coils.add(addr, false, true).unwrap();
        }
    }
    {
        let mut registers = image.holding_registers_mut();
        for addr in 0..10 {
            registers.add(addr, 0, true).unwrap();
        }
        registers.add(10, 0x12, false).unwrap();
    }
    image.input_registers_mut().add(0, 0x0815, false).unwrap();
    image.files_mut().add_file(4, 20).unwrap();
    {
        let mut fifos = image.fifos_mut();
        fifos.add_fifo(0x04DE).unwrap();
        fifos.push(0x04DE, 0x01B8).unwrap();
        fifos.push(0x04DE, 0x1284).unwrap();
    }
    image
}

async fn with_slave<F, Fut>(image: Arc<ProcessImage>, master: F) -> anyhow::Result<()>
where
    F: FnOnce(SocketAddr) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let server = Server::bind("127.0.0.1:0".parse()?)?;
    let socket_addr = server.local_addr()?;
    let service = ImageService::new(image);
    let on_connected = move |stream, socket_addr| {
        let service = service.clone();
        async move {
            accept_tcp_connection(stream, socket_addr, move |_| Ok(Some(service.clone())))
        }
    };
    tokio::select! {
        _ = server.serve(&on_connected) => unreachable!(),
        res = master(socket_addr) => res,
    }
}

async fn connect(socket_addr: SocketAddr) -> anyhow::Result<Context> {
    Ok(client::tcp::connect(socket_addr).await?)
}

#[tokio::test]
async fn repeated_register_write() -> anyhow::Result<()> {
    // Given
    let image = process_image();

    with_slave(Arc::clone(&image), |socket_addr| async move {
        let mut ctx = connect(socket_addr).await?;

        // When
        for value in 1..=20 {
            ctx.write_single_register(3, value).await??;
            // Then
            assert_eq!(ctx.read_holding_registers(3, 1).await??, [value]);
        }
        Ok(())
    })
    .await?;

    assert_eq!(image.holding_registers().get(3), Ok(20));
    Ok(())
}

#[tokio::test]
async fn read_only_register_rejects_writes() -> anyhow::Result<()> {
    // Given
    let image = process_image();

    with_slave(Arc::clone(&image), |socket_addr| async move {
        let mut ctx = connect(socket_addr).await?;

        // When
        let rsp = ctx.write_multiple_registers(8, &[1, 2, 3]).await?;

        // Then
        assert_eq!(rsp, Err(ExceptionCode::IllegalDataAddress));
        assert_eq!(ctx.read_holding_registers(8, 3).await??, [1, 2, 0x12]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn coils_and_masks() -> anyhow::Result<()> {
    // Given
    let image = process_image();

    with_slave(image, |socket_addr| async move {
        let mut ctx = connect(socket_addr).await?;

        // When
        ctx.write_multiple_coils(2, &[true, false, true]).await??;
        ctx.write_single_coil(15, true).await??;
        ctx.write_single_register(0, 0x12).await??;
        ctx.masked_write_register(0, 0xF2, 0x25).await??;

        // Then
        let coils = ctx.read_coils(0, 16).await??;
        assert_eq!(coils.len(), 16);
        assert_eq!(&coils[..6], &[false, false, true, false, true, false]);
        assert!(coils[15]);
        assert_eq!(ctx.read_holding_registers(0, 1).await??, [0x17]);
        assert_eq!(ctx.read_input_registers(0, 1).await??, [0x0815]);
        assert_eq!(
            ctx.read_input_registers(0, 2).await?,
            Err(ExceptionCode::IllegalDataAddress)
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn file_records_and_fifo_queue() -> anyhow::Result<()> {
    // Given
    let image = process_image();

    with_slave(image, |socket_addr| async move {
        let mut ctx = connect(socket_addr).await?;

        // When
        ctx.write_file_record(&[FileRecord {
            file_number: 4,
            record_number: 7,
            data: vec![0x06AF, 0x04BE, 0x100D],
        }])
        .await??;
        let records = ctx
            .read_file_record(&[FileRecordRequest {
                file_number: 4,
                record_number: 8,
                record_length: 2,
            }])
            .await??;
        let fifo = ctx.read_fifo_queue(0x04DE).await??;

        // Then
        assert_eq!(records, [vec![0x04BE, 0x100D]]);
        assert_eq!(fifo, [0x01B8, 0x1284]);
        Ok(())
    })
    .await
}
