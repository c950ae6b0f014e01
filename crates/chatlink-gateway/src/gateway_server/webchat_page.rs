//! Hosted webchat page wiring the browser widget to the broker.
use super::*;

const WEBCHAT_SCRIPT_URL: &str = "https://cdn.botframework.com/botframework-webchat/latest/webchat.js";
const WEBCHAT_TARGET_ID: &str = "webchat";

pub(super) fn render_gateway_webchat_page() -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>chatlink</title>
  <style>
    :root {{
      color-scheme: light;
      font-family: "IBM Plex Sans", "Segoe UI", sans-serif;
    }}
    html, body {{
      height: 100%;
      margin: 0;
      background: linear-gradient(160deg, #f4f6f8 0%, #eef2f7 100%);
      color: #13232f;
    }}
    .container {{
      display: flex;
      flex-direction: column;
      height: 100%;
      max-width: 880px;
      margin: 0 auto;
      padding: 1rem 1.5rem;
      box-sizing: border-box;
    }}
    h1 {{
      margin: 0 0 0.25rem 0;
      font-size: 1.4rem;
    }}
    .status {{
      margin: 0 0 0.75rem 0;
      font-size: 0.85rem;
      color: #3a4f5f;
    }}
    #{target_id} {{
      flex: 1;
      background: #ffffff;
      border: 1px solid #d2dde6;
      border-radius: 12px;
      overflow: hidden;
      box-shadow: 0 8px 20px rgba(12, 25, 38, 0.06);
    }}
  </style>
</head>
<body>
  <div class="container">
    <h1>chatlink</h1>
    <p class="status" id="status">connecting...</p>
    <div id="{target_id}" role="main"></div>
  </div>
  <script src="{script_url}"></script>
  <script>
    const CONVERSATIONS_ENDPOINT = "{conversations_endpoint}";
    const DIRECTLINE_DOMAIN = "{directline_domain}";
    const WATERMARK_KEY = "watermark";
    // The full bundle does not always re-export DirectLineJS's ConnectionStatus.
    const ConnectionStatus = (window.WebChat && window.WebChat.ConnectionStatus) || {{
      Online: 2,
      FailedToConnect: 4,
      Ended: 5
    }};
    const statusLine = document.getElementById("status");
    let activeDirectLine = null;

    function setStatus(text) {{
      statusLine.textContent = text;
    }}

    async function startConversation() {{
      const response = await fetch(CONVERSATIONS_ENDPOINT, {{ method: "POST" }});
      if (!response.ok) {{
        throw new Error("conversation request failed: status=" + response.status);
      }}
      const body = await response.json();
      return {{ token: body.token, conversationId: body.conversationId }};
    }}

    async function connect() {{
      const {{ token, conversationId }} = await startConversation();
      const directLine = window.WebChat.createDirectLine({{
        token,
        conversationId,
        domain: window.location.origin + DIRECTLINE_DOMAIN,
        webSocket: false
      }});
      activeDirectLine = directLine;

      directLine.activity$.subscribe((activity) => {{
        if (activity && activity.id) {{
          sessionStorage.setItem(WATERMARK_KEY, activity.id);
        }}
      }});
      directLine.connectionStatus$.subscribe((status) => {{
        if (directLine !== activeDirectLine) {{
          return;
        }}
        if (status === ConnectionStatus.Online) {{
          setStatus("online");
        }}
        if (status === ConnectionStatus.FailedToConnect || status === ConnectionStatus.Ended) {{
          setStatus("reconnecting...");
          activeDirectLine = null;
          connect().catch((error) => setStatus("reconnect failed: " + String(error)));
        }}
      }});

      const watermark = sessionStorage.getItem(WATERMARK_KEY) || undefined;
      window.WebChat.renderWebChat(
        {{ directLine, watermark }},
        document.getElementById("{target_id}")
      );
    }}

    connect().catch((error) => setStatus("connect failed: " + String(error)));
  </script>
</body>
</html>
"#,
        target_id = WEBCHAT_TARGET_ID,
        script_url = WEBCHAT_SCRIPT_URL,
        conversations_endpoint = CONVERSATIONS_ENDPOINT,
        directline_domain = DIRECTLINE_DOMAIN,
    )
}
