// Fan-out engine:

// * every sink receives identical bytes for N = 1, 2, 3
// * first failing sink wins, no block is read after the failure
// * sinks are flushed then closed in registration order

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use ingest_core::stream::{BlockSink, FanoutError, PipelineStream, WriterSink};
    use parking_lot::Mutex;
    use proptest::prelude::*;

    #[derive(Default, Clone)]
    struct Shared {
        bytes: Arc<Mutex<Vec<u8>>>,
        events: Arc<Mutex<Vec<String>>>,
    }

    struct RecordingSink {
        name: &'static str,
        shared: Shared,
        fail_on_block: Option<usize>,
        fail_on_close: bool,
        blocks: usize,
    }

    impl RecordingSink {
        fn boxed(name: &'static str, shared: &Shared) -> Box<dyn BlockSink> {
            Box::new(Self { name, shared: shared.clone(), fail_on_block: None, fail_on_close: false, blocks: 0 })
        }
    }

    impl BlockSink for RecordingSink {
        fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
            self.blocks += 1;
            if self.fail_on_block == Some(self.blocks) {
                return Err(io::Error::new(io::ErrorKind::Other, format!("{} refused block", self.name)));
            }
            self.shared.bytes.lock().extend_from_slice(block);
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.shared.events.lock().push(format!("flush {}", self.name));
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.shared.events.lock().push(format!("close {}", self.name));
            if self.fail_on_close {
                return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
            }
            Ok(())
        }
    }

    /// Counts how many bytes were pulled from the source.
    struct CountingReader<R> {
        inner: R,
        read: Arc<AtomicUsize>,
    }

    impl<R: Read> Read for CountingReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.read.fetch_add(n, Ordering::SeqCst);
            Ok(n)
        }
    }

// ## 1️⃣ Equivalence

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn every_sink_sees_the_source(
            data in proptest::collection::vec(any::<u8>(), 0..20_000),
            sinks in 1usize..=3,
            block in 1usize..4096,
        ) {
            let shared: Vec<Shared> = (0..sinks).map(|_| Shared::default()).collect();
            let boxed = shared.iter().map(|s| RecordingSink::boxed("s", s)).collect();

            let total = PipelineStream::new(block).copy(&mut Cursor::new(&data), boxed).unwrap();
            prop_assert_eq!(total, data.len() as u64);
            for s in &shared {
                prop_assert_eq!(&*s.bytes.lock(), &data);
            }
        }
    }

    #[test]
    fn no_sinks_is_an_error() {
        let err = PipelineStream::default().copy(&mut Cursor::new(b"x"), Vec::new()).unwrap_err();
        assert!(matches!(err, FanoutError::NoSinks));
    }

    #[test]
    fn writer_sink_adapts_any_writer() {
        let data = vec![5u8; 10_000];
        let shared = Shared::default();
        let sinks: Vec<Box<dyn BlockSink>> = vec![
            RecordingSink::boxed("a", &shared),
            Box::new(WriterSink::new(io::sink())),
        ];
        let total = PipelineStream::new(1024).copy(&mut Cursor::new(&data), sinks).unwrap();
        assert_eq!(total, 10_000);
        assert_eq!(*shared.bytes.lock(), data);
    }

// ## 2️⃣ Failure

    #[test]
    fn first_failing_sink_stops_the_copy() {
        let data = vec![1u8; 100 * 1024];
        let block = 1024;
        let (a, b, c) = (Shared::default(), Shared::default(), Shared::default());
        let sinks: Vec<Box<dyn BlockSink>> = vec![
            RecordingSink::boxed("a", &a),
            Box::new(RecordingSink {
                name: "b",
                shared: b.clone(),
                fail_on_block: Some(3),
                fail_on_close: false,
                blocks: 0,
            }),
            RecordingSink::boxed("c", &c),
        ];
        let read = Arc::new(AtomicUsize::new(0));
        let mut source = CountingReader { inner: Cursor::new(data), read: Arc::clone(&read) };

        let err = PipelineStream::new(block).copy(&mut source, sinks).unwrap_err();
        match err {
            FanoutError::Sink { index, ref source } => {
                assert_eq!(index, 1);
                assert!(source.to_string().contains("b refused"));
            }
            other => panic!("unexpected {other}"),
        }
        // Block 3 was the last one read; nothing after the failure.
        assert_eq!(read.load(Ordering::SeqCst), 3 * block);
        assert_eq!(b.bytes.lock().len(), 2 * block);
        // Failed run: nobody is closed.
        assert!(a.events.lock().iter().all(|e| !e.starts_with("close")));
        assert!(c.events.lock().iter().all(|e| !e.starts_with("close")));
    }

    #[test]
    fn inline_failure_is_reported_with_index_zero() {
        let shared = Shared::default();
        let sinks: Vec<Box<dyn BlockSink>> = vec![Box::new(RecordingSink {
            name: "only",
            shared: shared.clone(),
            fail_on_block: Some(1),
            fail_on_close: false,
            blocks: 0,
        })];
        let err = PipelineStream::new(16).copy(&mut Cursor::new(vec![0u8; 64]), sinks).unwrap_err();
        assert!(matches!(err, FanoutError::Sink { index: 0, .. }));
    }

// ## 3️⃣ Close order

    #[test]
    fn sinks_flush_then_close_in_order_even_after_a_close_error() {
        let shared = Shared::default();
        let sinks: Vec<Box<dyn BlockSink>> = vec![
            RecordingSink::boxed("a", &shared),
            Box::new(RecordingSink {
                name: "b",
                shared: shared.clone(),
                fail_on_block: None,
                fail_on_close: true,
                blocks: 0,
            }),
            RecordingSink::boxed("c", &shared),
        ];
        let err = PipelineStream::new(8).copy(&mut Cursor::new(vec![0u8; 20]), sinks).unwrap_err();
        assert!(matches!(err, FanoutError::Close { index: 1, .. }));

        let events = shared.events.lock().clone();
        let closes: Vec<&String> = events.iter().filter(|e| e.starts_with("close")).collect();
        assert_eq!(closes, ["close a", "close b", "close c"]);
        // All flushes happen before the first close.
        let first_close = events.iter().position(|e| e.starts_with("close")).unwrap();
        assert_eq!(events[..first_close].iter().filter(|e| e.starts_with("flush")).count(), 3);
    }
}
