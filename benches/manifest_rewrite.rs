//! Benchmark manifest parsing and rewriting on synthetic playlists.
//!
//! Measures:
//! - line classification alone (parse)
//! - full rewrite of a live-sized media playlist
//! - full rewrite of a long VOD playlist with keys and maps

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hls_relay::hls::{RelayEndpoint, base_uri, parse, rewrite};
use url::Url;

fn media_playlist(segments: usize) -> String {
    let mut text = String::from(
        "#EXTM3U\n#EXT-X-VERSION:6\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1000\n\
         #EXT-X-MAP:URI=\"init.mp4\"\n",
    );
    for i in 0..segments {
        if i % 10 == 0 {
            text.push_str(&format!(
                "#EXT-X-KEY:METHOD=AES-128,URI=\"keys/{i}.key\",IV=0x{i:032x}\n"
            ));
        }
        text.push_str("#EXTINF:6.006,\n");
        text.push_str(&format!("segments/seg{i:05}.m4s?token=abc123\n"));
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}

fn bench_manifest_rewrite(c: &mut Criterion) {
    let target = Url::parse("https://cdn.example.com/vod/title/1080p/index.m3u8").unwrap();
    let base = base_uri(&target);
    let endpoint = RelayEndpoint::new("/proxy");

    let mut group = c.benchmark_group("manifest_rewrite");

    for segments in [10usize, 1_000] {
        let text = media_playlist(segments);

        group.bench_with_input(BenchmarkId::new("parse", segments), &text, |b, text| {
            b.iter(|| parse(black_box(text)).count());
        });

        group.bench_with_input(BenchmarkId::new("rewrite", segments), &text, |b, text| {
            b.iter(|| rewrite(black_box(text), &base, &endpoint));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_manifest_rewrite);
criterion_main!(benches);
