#![no_main]

use agilewatch::octopus::UnitRatesPage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(page) = UnitRatesPage::from_slice(data) {
        for rate in &page.results {
            let _ = agilewatch::ControlSignal::from_price(rate.value_inc_vat);
        }
    }
});
