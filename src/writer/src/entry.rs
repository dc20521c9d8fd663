//! Tar entry encoding.
//!
//! Entries are laid out by hand on top of [`tar::Header`] so a single entry
//! can be rewritten in place without the end-of-archive marker that
//! `tar::Builder` appends when it is finished or dropped.

use std::io::{Error, ErrorKind};

use tar::{EntryType, Header};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Tar block size.
pub const BLOCK_SIZE: u64 = 512;

/// Length of the end-of-archive marker (two zero blocks).
pub const FOOTER_LEN: u64 = 2 * BLOCK_SIZE;

const ZERO_BLOCK: [u8; BLOCK_SIZE as usize] = [0; BLOCK_SIZE as usize];

/// Header for a plain regular file with deterministic metadata.
pub fn regular_file_header(name: &str, size: u64) -> std::io::Result<Header> {
    let mut header = Header::new_ustar();
    header.set_path(name)?;
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(size);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_cksum();
    Ok(header)
}

/// Zero bytes needed after `size` bytes of content.
pub fn padding_len(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

/// Bytes occupied by an entry of `size` content bytes, header included.
pub fn entry_len(size: u64) -> u64 {
    BLOCK_SIZE + size + padding_len(size)
}

/// Total archive length for a manifest and the given distinct layer sizes.
pub fn archive_len(manifest_len: u64, layer_sizes: impl IntoIterator<Item = u64>) -> u64 {
    entry_len(manifest_len) + layer_sizes.into_iter().map(entry_len).sum::<u64>() + FOOTER_LEN
}

/// Write header, exactly `size` bytes from `content`, and padding.
///
/// Content shorter or longer than `size` is rejected with `InvalidData`.
/// Returns the number of bytes written.
pub async fn write_entry<W, R>(
    dst: &mut W,
    name: &str,
    size: u64,
    content: &mut R,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    write_header(dst, name, size).await?;

    let copied = tokio::io::copy(&mut (&mut *content).take(size), dst).await?;
    if copied != size {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("content of '{name}' is {copied} bytes, expected {size}"),
        ));
    }

    let mut extra = [0u8; 1];
    if content.read(&mut extra).await? != 0 {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("content of '{name}' exceeds declared size {size}"),
        ));
    }

    write_padding(dst, size).await?;
    Ok(entry_len(size))
}

/// Write header and a zero-filled body of `size` bytes.
pub async fn write_placeholder<W>(dst: &mut W, name: &str, size: u64) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_header(dst, name, size).await?;
    tokio::io::copy(&mut tokio::io::repeat(0).take(size), dst).await?;
    write_padding(dst, size).await?;
    Ok(entry_len(size))
}

/// Write the end-of-archive marker.
pub async fn write_footer<W>(dst: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    dst.write_all(&ZERO_BLOCK).await?;
    dst.write_all(&ZERO_BLOCK).await
}

async fn write_header<W>(dst: &mut W, name: &str, size: u64) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = regular_file_header(name, size)?;
    dst.write_all(header.as_bytes()).await
}

async fn write_padding<W>(dst: &mut W, size: u64) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let padding = padding_len(size) as usize;
    dst.write_all(&ZERO_BLOCK[..padding]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_padding_and_lengths() {
        assert_eq!(padding_len(0), 0);
        assert_eq!(padding_len(1), 511);
        assert_eq!(padding_len(512), 0);
        assert_eq!(padding_len(1000), 24);

        assert_eq!(entry_len(0), 512);
        assert_eq!(entry_len(1000), 512 + 1024);
        assert_eq!(archive_len(10, [1000, 500]), 1024 + 1536 + 1024 + 1024);
    }

    #[test]
    fn test_regular_file_header() {
        let header = regular_file_header("sha256-aa.tar.gz", 1234).unwrap();
        assert_eq!(header.as_bytes().len(), BLOCK_SIZE as usize);
        assert_eq!(header.entry_type(), EntryType::Regular);
        assert_eq!(header.mode().unwrap(), 0o644);
        assert_eq!(header.size().unwrap(), 1234);
        assert_eq!(header.mtime().unwrap(), 0);
        assert_eq!(header.path().unwrap().to_str(), Some("sha256-aa.tar.gz"));
    }

    #[tokio::test]
    async fn test_entry_is_readable_tar() {
        let mut out = Vec::new();
        let written = write_entry(&mut out, "hello.txt", 5, &mut &b"hello"[..])
            .await
            .unwrap();
        write_footer(&mut out).await.unwrap();

        assert_eq!(written, entry_len(5));
        assert_eq!(out.len() as u64, entry_len(5) + FOOTER_LEN);

        let mut archive = tar::Archive::new(&out[..]);
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some("hello.txt"));
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
        drop(entry);
        assert!(entries.next().is_none());
    }

    #[tokio::test]
    async fn test_placeholder_matches_entry_layout() {
        let mut real = Vec::new();
        write_entry(&mut real, "layer", 700, &mut &[7u8; 700][..])
            .await
            .unwrap();

        let mut placeholder = Vec::new();
        write_placeholder(&mut placeholder, "layer", 700).await.unwrap();

        assert_eq!(real.len(), placeholder.len());
        assert_eq!(real[..512], placeholder[..512]);
        assert!(placeholder[512..].iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn test_short_content_rejected() {
        let mut out = Vec::new();
        let err = write_entry(&mut out, "short", 10, &mut &b"abc"[..])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_long_content_rejected() {
        let mut out = Vec::new();
        let err = write_entry(&mut out, "long", 2, &mut &b"abc"[..])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("exceeds"));
    }
}
