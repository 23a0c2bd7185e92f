use embedded_hal_async::delay::DelayNs;

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub(crate) struct FakeDelay {
    pub waits_ms: Vec<u32>,
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}
