use axum::response::{Html, IntoResponse};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="zh">
<head>
<meta charset="utf-8">
<title>AgriAgent 智慧农业巡检</title>
<style>
  body { font-family: sans-serif; background: #111; color: #eee; margin: 0; padding: 16px; }
  h1 { font-size: 20px; }
  .row { display: flex; gap: 16px; }
  .video { flex: 2; }
  .side { flex: 1; display: flex; flex-direction: column; gap: 12px; }
  img { width: 100%; background: #000; min-height: 360px; }
  button { padding: 8px 16px; margin-right: 8px; font-size: 14px; cursor: pointer; }
  pre, .status { background: #222; padding: 8px; border-radius: 4px; white-space: pre-wrap; }
  table { width: 100%; border-collapse: collapse; font-size: 13px; }
  th, td { border-bottom: 1px solid #333; padding: 4px; text-align: left; }
</style>
</head>
<body>
<h1>🚜 AgriAgent 农业巡检机器人控制台</h1>
<div>
  <button onclick="command('init')">1. 初始化系统</button>
  <button onclick="command('start')">2. 开始巡航</button>
  <button onclick="command('stop')">3. 停止</button>
</div>
<p class="status" id="status">等待操作...</p>
<div class="row">
  <div class="video"><img id="frame" alt="实时画面"></div>
  <div class="side">
    <pre id="telemetry">传感器离线</pre>
    <table>
      <thead><tr><th>时间</th><th>帧</th><th>诊断</th><th>指令</th></tr></thead>
      <tbody id="logs"></tbody>
    </table>
  </div>
</div>
<script>
async function command(name) {
  const res = await fetch('/api/v1/' + name, { method: 'POST' });
  const body = await res.json();
  document.getElementById('status').textContent = body.status;
}

function connect() {
  const proto = location.protocol === 'https:' ? 'wss' : 'ws';
  const ws = new WebSocket(proto + '://' + location.host + '/ws');
  ws.onmessage = (event) => {
    const msg = JSON.parse(event.data);
    if (msg.frame) {
      document.getElementById('frame').src = 'data:image/jpeg;base64,' + msg.frame;
    }
    document.getElementById('telemetry').textContent = msg.telemetry;
    document.getElementById('status').textContent = msg.status;
    const rows = msg.logs.map((r) =>
      '<tr><td>' + r.time + '</td><td>' + r.frame + '</td><td>' + r.diagnosis + '</td><td>' + r.command + '</td></tr>');
    document.getElementById('logs').innerHTML = rows.join('');
  };
  ws.onclose = () => setTimeout(connect, 1000);
}
connect();
</script>
</body>
</html>
"#;

pub async fn serve_index() -> impl IntoResponse {
    Html(INDEX_HTML)
}
