/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2025 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{future::Future, io, time::Duration};

use smol::{
    future::FutureExt,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    Timer,
};

pub const MAX_BUF_SIZE: usize = 1024 * 1024 * 16; // 16M
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Awaits an I/O future or fails with `TimedOut` after `dur`.
pub async fn io_timeout<F, T>(dur: Duration, f: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    f.or(async {
        Timer::after(dur).await;
        Err(io::ErrorKind::TimedOut.into())
    })
    .await
}

/// Read a single line from the stream into `buf`, without the trailing
/// CRLF or LF. Fails if the peer closes before sending anything or if
/// the line exceeds `MAX_BUF_SIZE`.
pub async fn read_from_stream<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<usize> {
    buf.clear();

    // Intermediate buffer we use to read byte-by-byte.
    let mut tmpbuf = [0_u8];

    loop {
        if buf.len() >= MAX_BUF_SIZE {
            return Err(io::ErrorKind::InvalidData.into())
        }

        match reader.read(&mut tmpbuf).await {
            Ok(0) if buf.is_empty() => return Err(io::ErrorKind::ConnectionAborted.into()),
            Ok(0) => break,
            Ok(_) => {
                if tmpbuf[0] == b'\n' {
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                    break
                }
                buf.push(tmpbuf[0]);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(buf.len())
}

/// Write a JSON string to the stream. As we're a line-based protocol,
/// CRLF is appended.
pub async fn write_to_stream<W: AsyncWrite + Unpin>(
    writer: &mut W,
    object: &str,
) -> io::Result<()> {
    for i in [object.as_bytes(), b"\r\n"] {
        writer.write_all(i).await?
    }

    writer.flush().await?;

    Ok(())
}
