use groove_engine::model::groove::GrooveStep;
use groove_engine::model::harmony::{ProgressionStep, ScaleType};
use groove_engine::model::note::{ArpMode, NoteSeriesEntry};
use groove_engine::model::pattern::TriggerSettings;
use groove_engine::model::song::Song;
use groove_engine::model::track::{PlayOrder, TrackSettings};

#[test]
fn roundtrip_song_yaml() {
    let mut s = Song::default();
    s.settings.progression = vec![ProgressionStep { key: 9, scale: ScaleType::Minor, bars: 2 }];
    let mut t = TrackSettings::new("Kick");
    t.trigger = TriggerSettings::euclidean(16, 5, 2);
    t.groove = vec![GrooveStep::new(10.0, -5.0), GrooveStep::default()];
    t.play_order = PlayOrder::RandomAdjacent;
    t.note_series = vec![NoteSeriesEntry { arp_mode: ArpMode::Pinky, ..NoteSeriesEntry::note(36, 110) }];
    s.tracks.push(t);

    let yaml = serde_yaml::to_string(&s).expect("serialize");
    let out: Song = serde_yaml::from_str(&yaml).expect("deserialize");

    assert_eq!(out, s);
    assert_eq!(out.tracks[0].name, "Kick");
}

#[test]
fn partial_yaml_takes_defaults() {
    let out: Song = serde_yaml::from_str("bpm: 96\ntracks:\n  - name: Hat\n").expect("deserialize");
    assert_eq!(out.settings.bpm, 96.0);
    assert_eq!(out.settings.lookahead_ms, 100.0);
    let t = &out.tracks[0];
    assert_eq!(t.channel, 1);
    assert_eq!(t.step_resolution, 16);
    assert_eq!(t.trigger, TriggerSettings::Init);
    assert_eq!(t.note_series.len(), 1);
}

#[test]
fn step_trigger_roundtrips_through_yaml() {
    let t = TrackSettings { trigger: TriggerSettings::steps([0, 6, 12]), ..TrackSettings::new("Clap") };
    let yaml = serde_yaml::to_string(&t).expect("serialize track");
    let out: TrackSettings = serde_yaml::from_str(&yaml).expect("deserialize track");
    assert_eq!(out.trigger, t.trigger);
}
