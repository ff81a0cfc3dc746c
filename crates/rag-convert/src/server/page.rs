//! Upload page served at `/`

use axum::response::Html;

/// GET / - Single-file upload form that previews the result and offers the JSON download
pub async fn upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE)
}

const UPLOAD_PAGE: &str = r##"<!DOCTYPE html>
<html lang="id">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>RAG Document Converter</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; }
  pre { background: #f5f5f5; padding: 1rem; overflow: auto; max-height: 60vh; }
  .error { color: #b00020; }
  .success { color: #1b5e20; }
  .hidden { display: none; }
</style>
</head>
<body>
<h1>RAG Document Converter</h1>
<p>Unggah dokumen Anda (PDF, EPUB, XLSX, DTA, CSV) untuk dikonversi ke format JSON yang siap untuk RAG.</p>

<form id="upload">
  <label for="file">Pilih file</label>
  <input id="file" name="file" type="file" accept=".pdf,.epub,.xlsx,.dta,.csv" required>
  <button type="submit">Konversi</button>
</form>

<pre id="details" class="hidden"></pre>
<p id="status"></p>
<p><a id="download" class="hidden" href="#">Unduh JSON</a></p>
<pre id="result" class="hidden"></pre>

<script>
const form = document.getElementById('upload');
const statusEl = document.getElementById('status');
const detailsEl = document.getElementById('details');
const resultEl = document.getElementById('result');
const downloadEl = document.getElementById('download');

form.addEventListener('submit', async (event) => {
  event.preventDefault();
  const input = document.getElementById('file');
  if (!input.files.length) return;

  const body = new FormData();
  body.append('file', input.files[0]);
  statusEl.className = '';
  statusEl.textContent = 'Memproses...';
  [detailsEl, resultEl, downloadEl].forEach((el) => el.classList.add('hidden'));

  try {
    const response = await fetch('/api/convert/preview', { method: 'POST', body });
    const payload = await response.json();
    if (!response.ok) {
      statusEl.className = 'error';
      statusEl.textContent = payload.error.type === 'unsupported_type'
        ? 'Format file tidak didukung.'
        : payload.error.message;
      return;
    }

    detailsEl.textContent = JSON.stringify(payload.file, null, 4);
    const json = JSON.stringify(payload.result, null, 4);
    resultEl.textContent = json;
    downloadEl.href = URL.createObjectURL(new Blob([json], { type: 'application/json' }));
    downloadEl.download = payload.output_filename;
    [detailsEl, resultEl, downloadEl].forEach((el) => el.classList.remove('hidden'));
    statusEl.className = 'success';
    statusEl.textContent = 'Konversi berhasil!';
  } catch (err) {
    statusEl.className = 'error';
    statusEl.textContent = String(err);
  }
});
</script>
</body>
</html>
"##;
