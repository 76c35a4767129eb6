use std::num::NonZeroU32;

use uuid::Uuid;

use crate::model::{Chart, ChartMeta, EndRepeat, Measure, Section};

fn fixed_id(value: &str) -> Uuid {
    Uuid::parse_str(value).expect("fixture id should be valid")
}

fn measure(id: &str, chord: &str) -> Measure {
    Measure {
        id: fixed_id(id),
        ..Measure::new(chord)
    }
}

/// The starter chart: "Intro" with `C | |: G | Am | F :|x2`.
#[must_use]
pub fn demo_chart() -> Chart {
    let mut chart = Chart::new(ChartMeta::default());
    chart.id = fixed_id("3d0c6f7e-2b1a-4c5d-9e8f-7a6b5c4d3e2f");

    let mut intro = Section::new("Intro");
    intro.id = fixed_id("5b7e2a10-8c3d-4f6e-a1b2-c3d4e5f60718");

    let mut turnaround = measure("c1a2b3d4-e5f6-4718-9a0b-1c2d3e4f5a01", "G");
    turnaround.start_repeat = true;
    let mut ending = measure("c1a2b3d4-e5f6-4718-9a0b-1c2d3e4f5a03", "F");
    ending.end_repeat = EndRepeat::Repeat(NonZeroU32::new(2));

    intro.measures = vec![
        measure("c1a2b3d4-e5f6-4718-9a0b-1c2d3e4f5a00", "C"),
        turnaround,
        measure("c1a2b3d4-e5f6-4718-9a0b-1c2d3e4f5a02", "Am"),
        ending,
    ];
    chart.sections = vec![intro];
    chart
}
