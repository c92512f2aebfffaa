//! S3 ETag computation.
//!
//! Reproduces the ETag the server assigns: a plain MD5 for objects uploaded
//! in one piece, and the composite `hex(md5(concat(md5_per_part)))-N` form
//! for multipart objects. The composite form applies exactly when the object
//! is larger than the part size and the part size is non-zero.

use md5::{Digest, Md5};

use crate::error::VfsResult;
use crate::fs::File;

/// Compute the ETag `file` would carry on S3 after an upload with the given
/// `part_size`.
pub async fn compute_etag(file: &mut dyn File, part_size: u64) -> VfsResult<String> {
    let size = file.stat().await?.size;

    if size > part_size && part_size > 0 {
        let mut digests: Vec<u8> = Vec::new();
        let mut parts: u32 = 0;
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            // hash exactly part_size bytes, or whatever remains
            let mut hasher = Md5::new();
            let mut hashed: u64 = 0;
            while hashed < part_size {
                let want = chunk.len().min((part_size - hashed) as usize);
                let n = file.read(&mut chunk[..want]).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&chunk[..n]);
                hashed += n as u64;
            }
            if hashed == 0 {
                break;
            }
            digests.extend_from_slice(&hasher.finalize());
            parts += 1;
            if hashed < part_size {
                break;
            }
        }
        Ok(format!("{}-{}", hex::encode(Md5::digest(&digests)), parts))
    } else {
        let mut hasher = Md5::new();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}
