//! Join a canvas, draw a ring of dots, and print what everyone paints.
//!
//! ```bash
//! CANVAS_URL=ws://localhost:3000/ws cargo run --example scribble
//! ```

use std::time::Duration;

use canvas_client::{Canvas, CanvasClient, CanvasEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let url = std::env::var("CANVAS_URL").unwrap_or_else(|_| "ws://localhost:3000/ws".into());
    let mut client = CanvasClient::connect(&url).await;
    let mut canvas = Canvas::default();

    // Wait for our identity and the history so far.
    while let Some(event) = client.next_event().await {
        canvas.apply(&event);
        if let CanvasEvent::Joined { identity, state } = &event {
            println!("joined as {} ({}), {} dots on canvas", identity.id, identity.color, state.len());
            break;
        }
    }

    for step in 0..24 {
        let angle = f64::from(step) * std::f64::consts::TAU / 24.0;
        client.paint(200.0 + 100.0 * angle.cos(), 200.0 + 100.0 * angle.sin())?;
    }

    // Watch the echoes (ours and anyone else's) for a few seconds.
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = client.next_event() => match event {
                Some(event) => {
                    if let CanvasEvent::Paint(dot) = &event {
                        println!("paint {} at ({:.0}, {:.0})", dot.color, dot.x, dot.y);
                    }
                    canvas.apply(&event);
                }
                None => break,
            },
        }
    }

    println!("canvas now holds {} dots", canvas.len());
    client.shutdown().await?;
    Ok(())
}
