//! Non-blocking file reads (spec §4.7), dispatched onto the reactor's
//! blocking thread pool via `tokio::task::spawn_blocking` since `Vfs::read`
//! is a synchronous call. The actual spawn lives in `io::Reactor`; this
//! module only holds the completion shape it produces.

/// One completed `readFile` call, addressed by the id the caller was given
/// when it was requested.
#[derive(Debug, Clone)]
pub struct FileReadCompletion {
    pub id: u64,
    pub result: Result<Vec<u8>, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_carries_plain_bytes_not_an_engine_handle() {
        let completion = FileReadCompletion { id: 1, result: Ok(vec![1, 2, 3]) };
        assert_eq!(completion.result.unwrap(), vec![1, 2, 3]);
    }
}
